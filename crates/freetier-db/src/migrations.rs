use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL,
                email           TEXT NOT NULL,
                password        TEXT,
                github_id       TEXT,
                github_login    TEXT,
                avatar_url      TEXT,
                access_token    TEXT,
                refresh_token   TEXT,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                deleted_at      TEXT
            );

            CREATE UNIQUE INDEX idx_users_username
                ON users(username) WHERE deleted_at IS NULL;
            CREATE UNIQUE INDEX idx_users_email
                ON users(email) WHERE deleted_at IS NULL;
            -- Password-only accounts carry no GitHub id and are exempt
            CREATE UNIQUE INDEX idx_users_github_id
                ON users(github_id)
                WHERE github_id IS NOT NULL AND github_id != '' AND deleted_at IS NULL;

            CREATE TABLE tiers (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id),
                platform        TEXT NOT NULL,
                name            TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                is_public       INTEGER NOT NULL DEFAULT 1,
                cpu_limit       TEXT NOT NULL DEFAULT '',
                memory_limit    TEXT NOT NULL DEFAULT '',
                storage_limit   TEXT NOT NULL DEFAULT '',
                bandwidth_limit TEXT NOT NULL DEFAULT '',
                monthly_hours   TEXT NOT NULL DEFAULT '',
                url             TEXT NOT NULL DEFAULT '',
                upvote_count    INTEGER NOT NULL DEFAULT 0 CHECK (upvote_count >= 0),
                downvote_count  INTEGER NOT NULL DEFAULT 0 CHECK (downvote_count >= 0),
                comment_count   INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                deleted_at      TEXT
            );

            CREATE INDEX idx_tiers_user ON tiers(user_id);
            CREATE INDEX idx_tiers_public_votes
                ON tiers(is_public, upvote_count DESC) WHERE deleted_at IS NULL;
            CREATE INDEX idx_tiers_platform_public
                ON tiers(platform, is_public) WHERE deleted_at IS NULL;

            CREATE TABLE votes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                tier_id     INTEGER NOT NULL REFERENCES tiers(id),
                vote_type   INTEGER NOT NULL CHECK (vote_type IN (1, -1)),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                deleted_at  TEXT
            );

            -- One live vote per (user, tier), whatever its type
            CREATE UNIQUE INDEX idx_votes_user_tier
                ON votes(user_id, tier_id) WHERE deleted_at IS NULL;
            CREATE INDEX idx_votes_tier ON votes(tier_id);

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                tier_id     INTEGER NOT NULL REFERENCES tiers(id),
                content     TEXT NOT NULL CHECK (length(content) BETWEEN 1 AND 100),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                deleted_at  TEXT
            );

            CREATE INDEX idx_comments_tier ON comments(tier_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
