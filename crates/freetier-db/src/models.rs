//! Database row types, mapped directly from SQLite rows.
//! Distinct from freetier-types API models so the DB layer stands alone.
//! Rows never carry `deleted_at`; lookups filter on it instead.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub github_id: Option<String>,
    pub github_login: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    /// The stored password hash, if the account has one. GitHub-only
    /// accounts do not.
    pub fn password_hash(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRow {
    pub id: i64,
    pub user_id: i64,
    pub owner_username: String,
    pub platform: String,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub storage_limit: String,
    pub bandwidth_limit: String,
    pub monthly_hours: String,
    pub url: String,
    pub upvote_count: i64,
    pub downvote_count: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRow {
    pub id: i64,
    pub user_id: i64,
    pub tier_id: i64,
    pub vote_type: i8,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRow {
    pub id: i64,
    pub user_id: i64,
    pub tier_id: i64,
    pub content: String,
    pub created_at: String,
}

/// A comment joined with its author's username for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentWithAuthor {
    pub comment: CommentRow,
    pub author_username: String,
}

// -- Inputs --

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
}

/// Identity fields supplied by GitHub on an OAuth login.
#[derive(Debug, Clone, Default)]
pub struct GithubIdentity {
    pub github_id: String,
    pub login: String,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct NewTier {
    pub platform: String,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub storage_limit: String,
    pub bandwidth_limit: String,
    pub monthly_hours: String,
    pub url: String,
}

/// Owner edits to a tier. `None` leaves the column unchanged. Counters are
/// not editable.
#[derive(Debug, Clone, Default)]
pub struct TierPatch {
    pub platform: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub storage_limit: Option<String>,
    pub bandwidth_limit: Option<String>,
    pub monthly_hours: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierSort {
    #[default]
    TopVoted,
    Recent,
}

#[derive(Debug, Clone, Default)]
pub struct TierFilter {
    pub platform: Option<String>,
    /// When set, lists that owner's tiers (public or not); otherwise only
    /// public tiers are listed.
    pub user_id: Option<i64>,
    pub sort: TierSort,
    /// 1-based.
    pub page: u32,
}

/// Live child-row counts for a tier, computed by aggregation. Used to check
/// the stored counters against the truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveCounts {
    pub upvotes: i64,
    pub downvotes: i64,
    pub comments: i64,
}
