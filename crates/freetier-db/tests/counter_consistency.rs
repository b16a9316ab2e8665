use std::path::PathBuf;
use std::thread;

use freetier_db::models::{LiveCounts, NewTier, NewUser, TierRow};
use freetier_db::{CascadePolicy, CounterError, Database, StorageError, VoteOutcome};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn user(db: &Database, name: &str) -> i64 {
    db.create_user(&NewUser {
        username: name.into(),
        email: format!("{name}@example.com"),
        password_hash: None,
    })
    .unwrap()
    .id
}

fn tier(db: &Database, owner: i64, platform: &str) -> i64 {
    db.create_tier(
        owner,
        &NewTier {
            platform: platform.into(),
            name: "Hobby".into(),
            description: String::new(),
            is_public: true,
            cpu_limit: "0.5 vCPU".into(),
            memory_limit: "512 MB".into(),
            storage_limit: "1 GB".into(),
            bandwidth_limit: "100 GB".into(),
            monthly_hours: "500".into(),
            url: format!("https://{}.example", platform.to_lowercase()),
        },
    )
    .unwrap()
    .id
}

fn stored(db: &Database, tier_id: i64) -> TierRow {
    db.get_tier_including_deleted(tier_id).unwrap().unwrap()
}

fn assert_consistent(db: &Database, tier_id: i64) {
    let row = stored(db, tier_id);
    let live = db.live_counts(tier_id).unwrap();
    assert_eq!(
        LiveCounts {
            upvotes: row.upvote_count,
            downvotes: row.downvote_count,
            comments: row.comment_count,
        },
        live,
        "stored counters drifted from live rows on tier {tier_id}"
    );
}

fn inject_failure(db: &Database, column: &str) {
    db.with_conn(|conn| -> anyhow::Result<()> {
        conn.execute_batch(&format!(
            "CREATE TRIGGER fail_{column} BEFORE UPDATE OF {column} ON tiers
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;"
        ))?;
        Ok(())
    })
    .unwrap();
}

fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("freetier-test-{}.db", uuid::Uuid::new_v4()))
}

#[test]
fn scenario_two_voters_then_toggle_off() {
    let db = Database::open_in_memory().unwrap();
    let u1 = user(&db, "u1");
    let u2 = user(&db, "u2");
    let t = tier(&db, u1, "Railway");

    let row = stored(&db, t);
    assert_eq!((row.upvote_count, row.downvote_count), (0, 0));

    assert!(matches!(db.apply_vote(u1, t, 1).unwrap(), VoteOutcome::Created(_)));
    let row = stored(&db, t);
    assert_eq!((row.upvote_count, row.downvote_count), (1, 0));

    assert!(matches!(db.apply_vote(u2, t, -1).unwrap(), VoteOutcome::Created(_)));
    let row = stored(&db, t);
    assert_eq!((row.upvote_count, row.downvote_count), (1, 1));

    assert!(matches!(db.apply_vote(u1, t, 1).unwrap(), VoteOutcome::Removed));
    let row = stored(&db, t);
    assert_eq!((row.upvote_count, row.downvote_count), (0, 1));

    assert_consistent(&db, t);
}

#[test]
fn scenario_comment_then_retract() {
    let db = Database::open_in_memory().unwrap();
    let u = user(&db, "commenter");
    let t = tier(&db, u, "Fly");

    let comment = db.apply_comment(u, t, "Great tier!").unwrap();
    assert_eq!(comment.content, "Great tier!");
    assert_eq!(stored(&db, t).comment_count, 1);

    db.retract_comment(comment.id).unwrap();
    assert_eq!(stored(&db, t).comment_count, 0);
    assert!(db.get_comment(comment.id).unwrap().is_none());

    // A retracted comment is gone for good
    assert!(matches!(
        db.retract_comment(comment.id),
        Err(CounterError::NotFound(_))
    ));
    assert_eq!(stored(&db, t).comment_count, 0);
}

#[test]
fn counter_failure_rolls_back_vote_insert() {
    let db = Database::open_in_memory().unwrap();
    let u = user(&db, "voter");
    let t = tier(&db, u, "Render");
    inject_failure(&db, "upvote_count");

    let err = db.apply_vote(u, t, 1).unwrap_err();
    assert!(matches!(err, CounterError::Storage(_)));
    assert!(!err.is_conflict());

    assert!(db.get_vote(u, t).unwrap().is_none());
    assert_eq!(stored(&db, t).upvote_count, 0);

    // Downvotes use a different column and still work
    db.apply_vote(u, t, -1).unwrap();
    assert_consistent(&db, t);
}

#[test]
fn counter_failure_rolls_back_vote_switch() {
    let db = Database::open_in_memory().unwrap();
    let u = user(&db, "switcher");
    let t = tier(&db, u, "Render");
    db.apply_vote(u, t, -1).unwrap();
    inject_failure(&db, "upvote_count");

    db.apply_vote(u, t, 1).unwrap_err();

    let vote = db.get_vote(u, t).unwrap().unwrap();
    assert_eq!(vote.vote_type, -1);
    let row = stored(&db, t);
    assert_eq!((row.upvote_count, row.downvote_count), (0, 1));
}

#[test]
fn counter_failure_rolls_back_comment_insert_and_retract() {
    let db = Database::open_in_memory().unwrap();
    let u = user(&db, "writer");
    let t = tier(&db, u, "Netlify");
    let kept = db.apply_comment(u, t, "before the trigger").unwrap();
    inject_failure(&db, "comment_count");

    assert!(matches!(
        db.apply_comment(u, t, "never stored"),
        Err(CounterError::Storage(_))
    ));
    assert_eq!(db.list_comments(t).unwrap().len(), 1);

    assert!(matches!(
        db.retract_comment(kept.id),
        Err(CounterError::Storage(_))
    ));
    assert!(db.get_comment(kept.id).unwrap().is_some());
    assert_eq!(stored(&db, t).comment_count, 1);
}

#[test]
fn second_live_vote_for_pair_is_a_conflict() {
    let db = Database::open_in_memory().unwrap();
    let u = user(&db, "dup");
    let t = tier(&db, u, "Vercel");
    db.apply_vote(u, t, 1).unwrap();

    let err = db
        .with_conn(|conn| -> Result<usize, StorageError> {
            Ok(conn.execute(
                "INSERT INTO votes (user_id, tier_id, vote_type) VALUES (?1, ?2, -1)",
                [u, t],
            )?)
        })
        .unwrap_err();
    assert!(err.is_conflict());

    // After toggling off, the pair is free again
    db.apply_vote(u, t, 1).unwrap();
    db.with_conn(|conn| -> Result<usize, StorageError> {
        Ok(conn.execute(
            "INSERT INTO votes (user_id, tier_id, vote_type) VALUES (?1, ?2, -1)",
            [u, t],
        )?)
    })
    .unwrap();
}

#[test]
fn concurrent_distinct_voters_lose_no_updates() {
    const VOTERS: usize = 16;

    let path = temp_db_path();
    let db = Database::open(&path).unwrap();
    let owner = user(&db, "owner");
    let t = tier(&db, owner, "Koyeb");
    let voters: Vec<i64> = (0..VOTERS).map(|i| user(&db, &format!("voter{i}"))).collect();

    // One connection per thread, opened up front
    let handles: Vec<Database> = (0..VOTERS)
        .map(|_| Database::open(&path).unwrap())
        .collect();

    let threads: Vec<_> = voters
        .into_iter()
        .zip(handles)
        .map(|(voter, handle)| {
            thread::spawn(move || {
                let mut outcome = handle.apply_vote(voter, t, 1);
                if outcome.as_ref().is_err_and(CounterError::is_conflict) {
                    outcome = handle.apply_vote(voter, t, 1);
                }
                outcome.unwrap()
            })
        })
        .collect();

    for thread in threads {
        assert!(matches!(thread.join().unwrap(), VoteOutcome::Created(_)));
    }

    assert_eq!(stored(&db, t).upvote_count, VOTERS as i64);
    assert_consistent(&db, t);

    drop(db);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

#[test]
fn concurrent_toggles_by_one_voter_stay_consistent() {
    const ROUNDS: usize = 8;

    let path = temp_db_path();
    let db = Database::open(&path).unwrap();
    let voter = user(&db, "flipper");
    let t = tier(&db, voter, "Deta");

    let handles: Vec<Database> = (0..ROUNDS)
        .map(|_| Database::open(&path).unwrap())
        .collect();

    let threads: Vec<_> = handles
        .into_iter()
        .enumerate()
        .map(|(i, handle)| {
            let vote_type = if i % 2 == 0 { 1 } else { -1 };
            thread::spawn(move || {
                let mut outcome = handle.apply_vote(voter, t, vote_type);
                if outcome.as_ref().is_err_and(CounterError::is_conflict) {
                    outcome = handle.apply_vote(voter, t, vote_type);
                }
                outcome.unwrap();
            })
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }

    let row = stored(&db, t);
    assert!(row.upvote_count + row.downvote_count <= 1);
    assert_consistent(&db, t);

    drop(db);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

#[test]
fn random_operation_sequences_keep_counters_exact() {
    let db = Database::open_in_memory().unwrap();
    let users: Vec<i64> = (0..5).map(|i| user(&db, &format!("user{i}"))).collect();
    let tiers: Vec<i64> = ["A", "B", "C"]
        .iter()
        .map(|p| tier(&db, users[0], p))
        .collect();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut comments: Vec<i64> = Vec::new();

    for step in 0..600 {
        let u = users[rng.random_range(0..users.len())];
        let t = tiers[rng.random_range(0..tiers.len())];

        match rng.random_range(0..10) {
            0..=5 => {
                let vote_type = if rng.random_bool(0.5) { 1 } else { -1 };
                db.apply_vote(u, t, vote_type).unwrap();
            }
            6..=7 => {
                let comment = db.apply_comment(u, t, &format!("step {step}")).unwrap();
                comments.push(comment.id);
            }
            _ => {
                if !comments.is_empty() {
                    let id = comments.swap_remove(rng.random_range(0..comments.len()));
                    db.retract_comment(id).unwrap();
                }
            }
        }

        for &t in &tiers {
            assert_consistent(&db, t);
        }
    }

    // Cascading one tier away zeroes it and leaves the others intact
    db.delete_tier(tiers[0], CascadePolicy::Cascade).unwrap();
    assert_eq!(db.live_counts(tiers[0]).unwrap(), LiveCounts::default());
    for &t in &tiers {
        assert_consistent(&db, t);
    }
}
