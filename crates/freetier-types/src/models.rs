use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user as returned by the API. Password hashes and provider tokens never
/// leave the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal user reference embedded in tiers and comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    pub id: i64,
    pub user_id: i64,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: UserSummary,
}

/// A tier with its live comments, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierDetail {
    #[serde(flatten)]
    pub tier: Tier,
    pub comments: Vec<CommentWithAuthor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub tier_id: i64,
    /// 1 for an upvote, -1 for a downvote.
    pub vote_type: i8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub tier_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
}
