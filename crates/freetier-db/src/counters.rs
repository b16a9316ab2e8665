//! The vote and comment write path.
//!
//! Every statement that creates, flips or deletes a vote or comment, and
//! every write to `upvote_count`, `downvote_count` or `comment_count`, lives
//! in this module. Each operation runs in one `BEGIN IMMEDIATE` transaction
//! that pairs the child-row write with its counter adjustment, and counters
//! only ever move by relative deltas (`col = col + ?`).
//!
//! Invariant, for every tier after every committed operation:
//! `upvote_count` = live +1 votes, `downvote_count` = live -1 votes,
//! `comment_count` = live comments.

use rusqlite::{OptionalExtension, Transaction, params};
use tracing::{debug, info};

use crate::error::{CounterError, StorageError};
use crate::models::{CommentRow, VoteRow};
use crate::queries::{COMMENT_COLUMNS, VOTE_COLUMNS, comment_from_row, vote_from_row};
use crate::{Database, NOW};

/// Comments are 1 to 100 characters inclusive, counted as Unicode scalars.
pub const MAX_COMMENT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    /// Stored rows are constrained to 1 or -1 by the schema.
    fn from_stored(value: i8) -> Self {
        if value > 0 { Self::Up } else { Self::Down }
    }

    fn counter(self) -> Counter {
        match self {
            Self::Up => Counter::Upvotes,
            Self::Down => Counter::Downvotes,
        }
    }
}

impl TryFrom<i8> for VoteType {
    type Error = CounterError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(CounterError::InvalidArgument(format!(
                "vote type must be 1 (upvote) or -1 (downvote), got {other}"
            ))),
        }
    }
}

/// What a vote did to the (user, tier) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// No live vote existed; one was inserted.
    Created(VoteRow),
    /// A live vote of the other type was flipped.
    Updated(VoteRow),
    /// A live vote of the same type was toggled off.
    Removed,
}

/// What happens to a tier's votes and comments when the tier is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadePolicy {
    /// Children stay live, hanging off the now-hidden tier, and the counters
    /// keep matching them. Undeleting the tier restores it intact.
    #[default]
    Orphan,
    /// Children are soft-deleted with the tier and the counters drop to zero.
    Cascade,
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    Upvotes,
    Downvotes,
    Comments,
}

impl Counter {
    fn column(self) -> &'static str {
        match self {
            Self::Upvotes => "upvote_count",
            Self::Downvotes => "downvote_count",
            Self::Comments => "comment_count",
        }
    }
}

impl Database {
    /// Cast, flip or toggle off `user_id`'s vote on `tier_id`.
    ///
    /// An invalid `vote_type` is rejected before a transaction is opened. A
    /// unique-constraint failure (two racing first votes for one pair) comes
    /// back as a conflict; retrying observes the winner's vote.
    pub fn apply_vote(
        &self,
        user_id: i64,
        tier_id: i64,
        vote_type: i8,
    ) -> Result<VoteOutcome, CounterError> {
        let requested = VoteType::try_from(vote_type)?;

        let outcome = self.with_write_tx(|tx| vote_in_tx(tx, user_id, tier_id, requested))?;

        match &outcome {
            VoteOutcome::Created(_) => {
                info!(user_id, tier_id, vote_type, "Vote created");
            }
            VoteOutcome::Updated(_) => {
                info!(user_id, tier_id, new_type = vote_type, old_type = -vote_type, "Vote updated");
            }
            VoteOutcome::Removed => {
                info!(user_id, tier_id, "Vote removed");
            }
        }
        Ok(outcome)
    }

    /// Attach a comment to a tier and bump its `comment_count`.
    ///
    /// `content` is validated as given; callers apply their own trimming first.
    pub fn apply_comment(
        &self,
        user_id: i64,
        tier_id: i64,
        content: &str,
    ) -> Result<CommentRow, CounterError> {
        validate_comment(content)?;

        let comment = self.with_write_tx(|tx| comment_in_tx(tx, user_id, tier_id, content))?;

        info!(comment_id = comment.id, tier_id, user_id, "Comment created");
        Ok(comment)
    }

    /// Delete a live comment and decrement its tier's `comment_count`.
    pub fn retract_comment(&self, comment_id: i64) -> Result<(), CounterError> {
        let tier_id = self.with_write_tx(|tx| retract_in_tx(tx, comment_id))?;

        info!(comment_id, tier_id, "Comment deleted");
        Ok(())
    }

    /// Soft-delete a live tier, applying `policy` to its children.
    pub fn delete_tier(&self, tier_id: i64, policy: CascadePolicy) -> Result<(), CounterError> {
        self.with_write_tx(|tx| delete_tier_in_tx(tx, tier_id, policy))?;

        info!(tier_id, ?policy, "Tier deleted");
        Ok(())
    }
}

fn validate_comment(content: &str) -> Result<(), CounterError> {
    let chars = content.chars().count();
    if chars == 0 || chars > MAX_COMMENT_CHARS {
        return Err(CounterError::InvalidArgument(format!(
            "comment must be between 1 and {MAX_COMMENT_CHARS} characters, got {chars}"
        )));
    }
    Ok(())
}

fn adjust(tx: &Transaction<'_>, tier_id: i64, counter: Counter, delta: i64) -> Result<(), CounterError> {
    if delta == 0 {
        return Ok(());
    }

    let column = counter.column();
    let changed = tx.execute(
        &format!("UPDATE tiers SET {column} = {column} + ?1 WHERE id = ?2"),
        params![delta, tier_id],
    )?;
    if changed != 1 {
        return Err(StorageError::MissingRow { table: "tiers", id: tier_id }.into());
    }

    debug!(tier_id, column, delta, "Counter adjusted");
    Ok(())
}

fn vote_in_tx(
    tx: &Transaction<'_>,
    user_id: i64,
    tier_id: i64,
    requested: VoteType,
) -> Result<VoteOutcome, CounterError> {
    let existing = tx
        .query_row(
            &format!(
                "SELECT {VOTE_COLUMNS} FROM votes
                 WHERE user_id = ?1 AND tier_id = ?2 AND deleted_at IS NULL"
            ),
            params![user_id, tier_id],
            vote_from_row,
        )
        .optional()?;

    let Some(existing) = existing else {
        let vote = tx.query_row(
            &format!(
                "INSERT INTO votes (user_id, tier_id, vote_type) VALUES (?1, ?2, ?3)
                 RETURNING {VOTE_COLUMNS}"
            ),
            params![user_id, tier_id, requested.as_i8()],
            vote_from_row,
        )?;
        adjust(tx, tier_id, requested.counter(), 1)?;
        return Ok(VoteOutcome::Created(vote));
    };

    let held = VoteType::from_stored(existing.vote_type);

    if held == requested {
        tx.execute(
            &format!("UPDATE votes SET deleted_at = {NOW}, updated_at = {NOW} WHERE id = ?1"),
            [existing.id],
        )?;
        adjust(tx, tier_id, held.counter(), -1)?;
        return Ok(VoteOutcome::Removed);
    }

    let vote = tx.query_row(
        &format!(
            "UPDATE votes SET vote_type = ?1, updated_at = {NOW} WHERE id = ?2
             RETURNING {VOTE_COLUMNS}"
        ),
        params![requested.as_i8(), existing.id],
        vote_from_row,
    )?;
    adjust(tx, tier_id, held.counter(), -1)?;
    adjust(tx, tier_id, requested.counter(), 1)?;
    Ok(VoteOutcome::Updated(vote))
}

fn comment_in_tx(
    tx: &Transaction<'_>,
    user_id: i64,
    tier_id: i64,
    content: &str,
) -> Result<CommentRow, CounterError> {
    let comment = tx.query_row(
        &format!(
            "INSERT INTO comments (user_id, tier_id, content) VALUES (?1, ?2, ?3)
             RETURNING {COMMENT_COLUMNS}"
        ),
        params![user_id, tier_id, content],
        comment_from_row,
    )?;
    adjust(tx, tier_id, Counter::Comments, 1)?;
    Ok(comment)
}

fn retract_in_tx(tx: &Transaction<'_>, comment_id: i64) -> Result<i64, CounterError> {
    let tier_id: i64 = tx
        .query_row(
            "SELECT tier_id FROM comments WHERE id = ?1 AND deleted_at IS NULL",
            [comment_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| CounterError::NotFound(format!("comment {comment_id}")))?;

    tx.execute(
        &format!("UPDATE comments SET deleted_at = {NOW}, updated_at = {NOW} WHERE id = ?1"),
        [comment_id],
    )?;
    adjust(tx, tier_id, Counter::Comments, -1)?;
    Ok(tier_id)
}

fn delete_tier_in_tx(
    tx: &Transaction<'_>,
    tier_id: i64,
    policy: CascadePolicy,
) -> Result<(), CounterError> {
    let deleted = tx.execute(
        &format!(
            "UPDATE tiers SET deleted_at = {NOW}, updated_at = {NOW}
             WHERE id = ?1 AND deleted_at IS NULL"
        ),
        [tier_id],
    )?;
    if deleted == 0 {
        return Err(CounterError::NotFound(format!("tier {tier_id}")));
    }

    if policy == CascadePolicy::Orphan {
        return Ok(());
    }

    for vote_type in [VoteType::Up, VoteType::Down] {
        let removed = tx.execute(
            &format!(
                "UPDATE votes SET deleted_at = {NOW}, updated_at = {NOW}
                 WHERE tier_id = ?1 AND vote_type = ?2 AND deleted_at IS NULL"
            ),
            params![tier_id, vote_type.as_i8()],
        )?;
        adjust(tx, tier_id, vote_type.counter(), -(removed as i64))?;
    }

    let removed = tx.execute(
        &format!(
            "UPDATE comments SET deleted_at = {NOW}, updated_at = {NOW}
             WHERE tier_id = ?1 AND deleted_at IS NULL"
        ),
        [tier_id],
    )?;
    adjust(tx, tier_id, Counter::Comments, -(removed as i64))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTier, NewUser};

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user(&NewUser {
                username: "voter".into(),
                email: "voter@example.com".into(),
                password_hash: None,
            })
            .unwrap();
        let tier = db.create_tier(user.id, &sample_tier("Railway")).unwrap();
        (db, user.id, tier.id)
    }

    fn sample_tier(platform: &str) -> NewTier {
        NewTier {
            platform: platform.into(),
            name: format!("{platform} Free"),
            description: String::new(),
            is_public: true,
            cpu_limit: "0.5 vCPU".into(),
            memory_limit: "512MB".into(),
            storage_limit: String::new(),
            bandwidth_limit: String::new(),
            monthly_hours: String::new(),
            url: String::new(),
        }
    }

    fn counts(db: &Database, tier_id: i64) -> (i64, i64, i64) {
        let tier = db.get_tier_including_deleted(tier_id).unwrap().unwrap();
        (tier.upvote_count, tier.downvote_count, tier.comment_count)
    }

    #[test]
    fn vote_type_parsing() {
        assert_eq!(VoteType::try_from(1).unwrap(), VoteType::Up);
        assert_eq!(VoteType::try_from(-1).unwrap(), VoteType::Down);
        assert!(matches!(VoteType::try_from(0), Err(CounterError::InvalidArgument(_))));
        assert!(matches!(VoteType::try_from(2), Err(CounterError::InvalidArgument(_))));
    }

    #[test]
    fn toggle_restores_counter() {
        let (db, user, tier) = setup();

        let first = db.apply_vote(user, tier, 1).unwrap();
        assert!(matches!(first, VoteOutcome::Created(ref v) if v.vote_type == 1));
        assert_eq!(counts(&db, tier), (1, 0, 0));

        let second = db.apply_vote(user, tier, 1).unwrap();
        assert_eq!(second, VoteOutcome::Removed);
        assert_eq!(counts(&db, tier), (0, 0, 0));
        assert!(db.get_vote(user, tier).unwrap().is_none());
    }

    #[test]
    fn switch_moves_one_vote_between_counters() {
        let (db, user, tier) = setup();

        let created = db.apply_vote(user, tier, 1).unwrap();
        let updated = db.apply_vote(user, tier, -1).unwrap();

        let (VoteOutcome::Created(a), VoteOutcome::Updated(b)) = (created, updated) else {
            panic!("expected Created then Updated");
        };
        assert_eq!(a.id, b.id);
        assert_eq!(b.vote_type, -1);
        assert_eq!(counts(&db, tier), (0, 1, 0));
    }

    #[test]
    fn revote_after_toggle_off_creates_fresh_row() {
        let (db, user, tier) = setup();

        db.apply_vote(user, tier, -1).unwrap();
        db.apply_vote(user, tier, -1).unwrap();
        let again = db.apply_vote(user, tier, -1).unwrap();

        assert!(matches!(again, VoteOutcome::Created(_)));
        assert_eq!(counts(&db, tier), (0, 1, 0));
    }

    #[test]
    fn invalid_vote_type_touches_nothing() {
        let (db, user, tier) = setup();

        let err = db.apply_vote(user, tier, 0).unwrap_err();
        assert!(matches!(err, CounterError::InvalidArgument(_)));
        assert_eq!(counts(&db, tier), (0, 0, 0));
        assert!(db.get_vote(user, tier).unwrap().is_none());
    }

    #[test]
    fn vote_on_missing_tier_is_storage_failure() {
        let (db, user, _) = setup();

        let err = db.apply_vote(user, 9999, 1).unwrap_err();
        assert!(matches!(err, CounterError::Storage(_)));
        assert!(!err.is_conflict());
    }

    #[test]
    fn comment_length_boundaries() {
        let (db, user, tier) = setup();

        let too_long = "x".repeat(101);
        for bad in ["", too_long.as_str()] {
            let err = db.apply_comment(user, tier, bad).unwrap_err();
            assert!(matches!(err, CounterError::InvalidArgument(_)), "{bad:?}");
        }
        assert_eq!(counts(&db, tier), (0, 0, 0));

        db.apply_comment(user, tier, "x").unwrap();
        db.apply_comment(user, tier, &"x".repeat(100)).unwrap();
        assert_eq!(counts(&db, tier), (0, 0, 2));
    }

    #[test]
    fn comment_length_counts_characters_not_bytes() {
        let (db, user, tier) = setup();

        // 100 two-byte characters
        db.apply_comment(user, tier, &"é".repeat(100)).unwrap();
        assert_eq!(counts(&db, tier), (0, 0, 1));
    }

    #[test]
    fn retract_missing_comment_is_not_found() {
        let (db, user, tier) = setup();

        let comment = db.apply_comment(user, tier, "Great tier!").unwrap();
        db.retract_comment(comment.id).unwrap();

        let err = db.retract_comment(comment.id).unwrap_err();
        assert!(matches!(err, CounterError::NotFound(_)));
        assert_eq!(counts(&db, tier), (0, 0, 0));

        assert!(matches!(db.retract_comment(424242), Err(CounterError::NotFound(_))));
    }

    #[test]
    fn orphan_delete_keeps_children_and_counters() {
        let (db, user, tier) = setup();
        db.apply_vote(user, tier, 1).unwrap();
        db.apply_comment(user, tier, "still here").unwrap();

        db.delete_tier(tier, CascadePolicy::Orphan).unwrap();

        assert!(db.get_tier(tier).unwrap().is_none());
        assert_eq!(counts(&db, tier), (1, 0, 1));
        assert!(db.get_vote(user, tier).unwrap().is_some());
        assert_eq!(db.live_counts(tier).unwrap().comments, 1);
    }

    #[test]
    fn cascade_delete_removes_children_and_zeroes_counters() {
        let (db, user, tier) = setup();
        let other = db
            .create_user(&NewUser {
                username: "other".into(),
                email: "other@example.com".into(),
                password_hash: None,
            })
            .unwrap();
        db.apply_vote(user, tier, 1).unwrap();
        db.apply_vote(other.id, tier, -1).unwrap();
        db.apply_comment(user, tier, "gone soon").unwrap();

        db.delete_tier(tier, CascadePolicy::Cascade).unwrap();

        assert_eq!(counts(&db, tier), (0, 0, 0));
        assert_eq!(db.live_counts(tier).unwrap(), Default::default());
    }

    #[test]
    fn deleting_missing_tier_is_not_found() {
        let (db, _, tier) = setup();

        db.delete_tier(tier, CascadePolicy::Orphan).unwrap();
        let err = db.delete_tier(tier, CascadePolicy::Orphan).unwrap_err();
        assert!(matches!(err, CounterError::NotFound(_)));
    }
}
