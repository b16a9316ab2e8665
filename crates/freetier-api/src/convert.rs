//! Row-to-API conversions.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use freetier_db::models::{CommentRow, CommentWithAuthor, TierRow, UserRow, VoteRow};
use freetier_types::models::{self, Comment, Tier, User, UserSummary, Vote};

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS.fff" in UTC without a zone.
pub(crate) fn parse_timestamp(raw: &str, what: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {} '{}': {}", raw, what, id, e);
            DateTime::default()
        })
}

pub fn user(row: UserRow) -> User {
    User {
        created_at: parse_timestamp(&row.created_at, "user", row.id),
        updated_at: parse_timestamp(&row.updated_at, "user", row.id),
        id: row.id,
        username: row.username,
        email: row.email,
        github_id: row.github_id.filter(|s| !s.is_empty()),
        github_login: row.github_login.filter(|s| !s.is_empty()),
        avatar_url: row.avatar_url.filter(|s| !s.is_empty()),
    }
}

pub fn tier(row: TierRow) -> Tier {
    Tier {
        created_at: parse_timestamp(&row.created_at, "tier", row.id),
        updated_at: parse_timestamp(&row.updated_at, "tier", row.id),
        user: UserSummary {
            id: row.user_id,
            username: row.owner_username,
        },
        id: row.id,
        user_id: row.user_id,
        platform: row.platform,
        name: row.name,
        description: row.description,
        is_public: row.is_public,
        cpu_limit: row.cpu_limit,
        memory_limit: row.memory_limit,
        storage_limit: row.storage_limit,
        bandwidth_limit: row.bandwidth_limit,
        monthly_hours: row.monthly_hours,
        url: row.url,
        upvote_count: row.upvote_count,
        downvote_count: row.downvote_count,
        comment_count: row.comment_count,
    }
}

pub fn vote(row: VoteRow) -> Vote {
    Vote {
        created_at: parse_timestamp(&row.created_at, "vote", row.id),
        id: row.id,
        user_id: row.user_id,
        tier_id: row.tier_id,
        vote_type: row.vote_type,
    }
}

pub fn comment(row: CommentRow) -> Comment {
    Comment {
        created_at: parse_timestamp(&row.created_at, "comment", row.id),
        id: row.id,
        user_id: row.user_id,
        tier_id: row.tier_id,
        content: row.content,
    }
}

pub fn comment_with_author(row: CommentWithAuthor) -> models::CommentWithAuthor {
    models::CommentWithAuthor {
        user: UserSummary {
            id: row.comment.user_id,
            username: row.author_username,
        },
        comment: comment(row.comment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_sqlite_millisecond_timestamps() {
        let ts = parse_timestamp("2024-05-01 12:34:56.789", "tier", 1);
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 5, 1));
        assert_eq!(ts.timestamp_subsec_millis(), 789);
        assert_eq!(ts.second(), 56);
    }

    #[test]
    fn parses_whole_second_and_rfc3339_timestamps() {
        assert_eq!(parse_timestamp("2024-05-01 12:34:56", "tier", 1).minute(), 34);
        assert_eq!(parse_timestamp("2024-05-01T12:34:56Z", "tier", 1).hour(), 12);
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp("yesterday", "tier", 1), DateTime::<Utc>::default());
    }
}
