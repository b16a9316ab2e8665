use crate::error::StorageError;
use crate::models::{
    CommentRow, CommentWithAuthor, GithubIdentity, LiveCounts, NewTier, NewUser, TierFilter,
    TierPatch, TierRow, TierSort, UserRow, VoteRow,
};
use crate::{Database, NOW};
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

/// Tiers per page in listings.
pub const TIER_PAGE_SIZE: u32 = 20;

const USER_COLUMNS: &str = "id, username, email, password, github_id, github_login, avatar_url,
     access_token, refresh_token, created_at, updated_at";

pub(crate) const VOTE_COLUMNS: &str = "id, user_id, tier_id, vote_type, created_at, updated_at";

pub(crate) const COMMENT_COLUMNS: &str = "id, user_id, tier_id, content, created_at";

// JOIN users to fetch owner_username in a single query
const TIER_SELECT: &str = "SELECT t.id, t.user_id, u.username, t.platform, t.name, t.description,
            t.is_public, t.cpu_limit, t.memory_limit, t.storage_limit, t.bandwidth_limit,
            t.monthly_hours, t.url, t.upvote_count, t.downvote_count, t.comment_count,
            t.created_at, t.updated_at
     FROM tiers t
     LEFT JOIN users u ON t.user_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "INSERT INTO users (username, email, password) VALUES (?1, ?2, ?3)
                         RETURNING {USER_COLUMNS}"
                    ),
                    params![user.username, user.email, user.password_hash],
                    user_from_row,
                )
                .map_err(StorageError::from)?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "id = ?1", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "username = ?1", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "email = ?1", email))
    }

    pub fn get_user_by_github_id(&self, github_id: &str) -> Result<Option<UserRow>> {
        if github_id.is_empty() {
            return Ok(None);
        }
        self.with_conn(|conn| query_user_where(conn, "github_id = ?1", github_id))
    }

    /// Whether a live user already holds this email or this username.
    pub fn user_exists(&self, email: &str, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users
                 WHERE (email = ?1 OR username = ?2) AND deleted_at IS NULL)",
                params![email, username],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Find the user linked to a GitHub account, refreshing their provider
    /// tokens and avatar, or create one. Returns `(user, created)`.
    pub fn upsert_github_user(&self, identity: &GithubIdentity) -> Result<(UserRow, bool)> {
        self.with_write_tx(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM users WHERE github_id = ?1 AND deleted_at IS NULL",
                    [&identity.github_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                let row = tx.query_row(
                    &format!(
                        "UPDATE users SET access_token = ?1, refresh_token = ?2, avatar_url = ?3,
                             updated_at = {NOW}
                         WHERE id = ?4
                         RETURNING {USER_COLUMNS}"
                    ),
                    params![
                        identity.access_token,
                        identity.refresh_token,
                        identity.avatar_url,
                        id
                    ],
                    user_from_row,
                )?;
                return Ok((row, false));
            }

            let row = tx
                .query_row(
                    &format!(
                        "INSERT INTO users (username, email, github_id, github_login, avatar_url,
                             access_token, refresh_token)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         RETURNING {USER_COLUMNS}"
                    ),
                    params![
                        identity.username,
                        identity.email,
                        identity.github_id,
                        identity.login,
                        identity.avatar_url,
                        identity.access_token,
                        identity.refresh_token
                    ],
                    user_from_row,
                )
                .map_err(StorageError::from)?;
            Ok((row, true))
        })
    }

    // -- Tiers --

    /// Counters always start at zero; only the counter engine moves them.
    pub fn create_tier(&self, owner_id: i64, tier: &NewTier) -> Result<TierRow> {
        self.with_conn_mut(|conn| {
            let id: i64 = conn.query_row(
                "INSERT INTO tiers (user_id, platform, name, description, is_public, cpu_limit,
                     memory_limit, storage_limit, bandwidth_limit, monthly_hours, url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 RETURNING id",
                params![
                    owner_id,
                    tier.platform,
                    tier.name,
                    tier.description,
                    tier.is_public,
                    tier.cpu_limit,
                    tier.memory_limit,
                    tier.storage_limit,
                    tier.bandwidth_limit,
                    tier.monthly_hours,
                    tier.url
                ],
                |row| row.get(0),
            )?;
            query_tier(conn, id, false)?.ok_or_else(|| {
                anyhow::Error::from(StorageError::MissingRow { table: "tiers", id })
            })
        })
    }

    pub fn get_tier(&self, id: i64) -> Result<Option<TierRow>> {
        self.with_conn(|conn| query_tier(conn, id, false))
    }

    /// Also returns soft-deleted tiers, whose counters still mean something
    /// under the orphan policy.
    pub fn get_tier_including_deleted(&self, id: i64) -> Result<Option<TierRow>> {
        self.with_conn(|conn| query_tier(conn, id, true))
    }

    pub fn list_tiers(&self, filter: &TierFilter) -> Result<Vec<TierRow>> {
        self.with_conn(|conn| query_tiers(conn, filter))
    }

    /// Apply an owner's edits. Returns `None` if the tier is missing or deleted.
    pub fn update_tier(&self, id: i64, patch: &TierPatch) -> Result<Option<TierRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE tiers SET
                         platform        = COALESCE(?1, platform),
                         name            = COALESCE(?2, name),
                         description     = COALESCE(?3, description),
                         is_public       = COALESCE(?4, is_public),
                         cpu_limit       = COALESCE(?5, cpu_limit),
                         memory_limit    = COALESCE(?6, memory_limit),
                         storage_limit   = COALESCE(?7, storage_limit),
                         bandwidth_limit = COALESCE(?8, bandwidth_limit),
                         monthly_hours   = COALESCE(?9, monthly_hours),
                         url             = COALESCE(?10, url),
                         updated_at      = {NOW}
                     WHERE id = ?11 AND deleted_at IS NULL"
                ),
                params![
                    patch.platform,
                    patch.name,
                    patch.description,
                    patch.is_public,
                    patch.cpu_limit,
                    patch.memory_limit,
                    patch.storage_limit,
                    patch.bandwidth_limit,
                    patch.monthly_hours,
                    patch.url,
                    id
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_tier(conn, id, false)
        })
    }

    // -- Votes --

    pub fn get_vote(&self, user_id: i64, tier_id: i64) -> Result<Option<VoteRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {VOTE_COLUMNS} FROM votes
                         WHERE user_id = ?1 AND tier_id = ?2 AND deleted_at IS NULL"
                    ),
                    params![user_id, tier_id],
                    vote_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Comments --

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1 AND deleted_at IS NULL"
                    ),
                    [id],
                    comment_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Live comments on a tier, newest first.
    pub fn list_comments(&self, tier_id: i64) -> Result<Vec<CommentWithAuthor>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user_id, c.tier_id, c.content, c.created_at, u.username
                 FROM comments c
                 LEFT JOIN users u ON c.user_id = u.id
                 WHERE c.tier_id = ?1 AND c.deleted_at IS NULL
                 ORDER BY c.created_at DESC, c.id DESC",
            )?;
            let rows = stmt
                .query_map([tier_id], |row| {
                    Ok(CommentWithAuthor {
                        comment: comment_from_row(row)?,
                        author_username: row
                            .get::<_, Option<String>>(5)?
                            .unwrap_or_else(|| "unknown".to_string()),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Consistency --

    /// Count a tier's live children directly, bypassing the stored counters.
    pub fn live_counts(&self, tier_id: i64) -> Result<LiveCounts> {
        self.with_conn(|conn| {
            let (upvotes, downvotes): (i64, i64) = conn.query_row(
                "SELECT
                     COALESCE(SUM(CASE WHEN vote_type = 1 THEN 1 ELSE 0 END), 0),
                     COALESCE(SUM(CASE WHEN vote_type = -1 THEN 1 ELSE 0 END), 0)
                 FROM votes WHERE tier_id = ?1 AND deleted_at IS NULL",
                [tier_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let comments: i64 = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE tier_id = ?1 AND deleted_at IS NULL",
                [tier_id],
                |row| row.get(0),
            )?;
            Ok(LiveCounts {
                upvotes,
                downvotes,
                comments,
            })
        })
    }
}

fn query_user_where<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    value: P,
) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate} AND deleted_at IS NULL"),
            [value],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_tier(conn: &Connection, id: i64, include_deleted: bool) -> Result<Option<TierRow>> {
    let live = if include_deleted { "" } else { " AND t.deleted_at IS NULL" };
    let row = conn
        .query_row(&format!("{TIER_SELECT} WHERE t.id = ?1{live}"), [id], tier_from_row)
        .optional()?;
    Ok(row)
}

fn query_tiers(conn: &Connection, filter: &TierFilter) -> Result<Vec<TierRow>> {
    let mut clauses = vec!["t.deleted_at IS NULL".to_string()];
    let mut values: Vec<Value> = Vec::new();

    if let Some(platform) = &filter.platform {
        values.push(Value::Text(platform.clone()));
        clauses.push(format!("t.platform = ?{}", values.len()));
    }

    match filter.user_id {
        Some(user_id) => {
            values.push(Value::Integer(user_id));
            clauses.push(format!("t.user_id = ?{}", values.len()));
        }
        None => clauses.push("t.is_public = 1".to_string()),
    }

    let order = match filter.sort {
        TierSort::Recent => "t.created_at DESC, t.id DESC",
        TierSort::TopVoted => "t.upvote_count DESC, t.created_at DESC, t.id DESC",
    };

    // Computed in i64; page * page size can exceed u32::MAX.
    let offset = (i64::from(filter.page.max(1)) - 1) * i64::from(TIER_PAGE_SIZE);
    values.push(Value::Integer(i64::from(TIER_PAGE_SIZE)));
    let limit_idx = values.len();
    values.push(Value::Integer(offset));
    let offset_idx = values.len();

    let sql = format!(
        "{TIER_SELECT} WHERE {} ORDER BY {order} LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
        clauses.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), tier_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        github_id: row.get(4)?,
        github_login: row.get(5)?,
        avatar_url: row.get(6)?,
        access_token: row.get(7)?,
        refresh_token: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn tier_from_row(row: &Row<'_>) -> rusqlite::Result<TierRow> {
    Ok(TierRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        owner_username: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        platform: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        is_public: row.get(6)?,
        cpu_limit: row.get(7)?,
        memory_limit: row.get(8)?,
        storage_limit: row.get(9)?,
        bandwidth_limit: row.get(10)?,
        monthly_hours: row.get(11)?,
        url: row.get(12)?,
        upvote_count: row.get(13)?,
        downvote_count: row.get(14)?,
        comment_count: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

pub(crate) fn vote_from_row(row: &Row<'_>) -> rusqlite::Result<VoteRow> {
    Ok(VoteRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tier_id: row.get(2)?,
        vote_type: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub(crate) fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        tier_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
