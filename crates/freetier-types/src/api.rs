use serde::{Deserialize, Serialize};

use crate::models::{Tier, User};

// -- JWT Claims --

/// What a signed token may be used for. A token is only ever accepted for
/// the purpose it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Session,
}

/// JWT claims shared by access, refresh and session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Any one identifier is enough; when several are given, email wins over
/// username, and username over GitHub id.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub github_id: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: User,
    pub tokens: TokenResponse,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
}

// -- Tiers --

#[derive(Debug, Deserialize)]
pub struct CreateTierRequest {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default)]
    pub cpu_limit: String,
    #[serde(default)]
    pub memory_limit: String,
    #[serde(default)]
    pub storage_limit: String,
    #[serde(default)]
    pub bandwidth_limit: String,
    #[serde(default)]
    pub monthly_hours: String,
    #[serde(default)]
    pub url: String,
}

fn default_public() -> bool {
    true
}

/// Absent fields are left unchanged. Counter fields are not accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateTierRequest {
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

#[derive(Debug, Default, Deserialize)]
pub struct TierListQuery {
    pub platform: Option<String>,
    pub user_id: Option<i64>,
    /// `recent` sorts by creation time; anything else by upvotes.
    pub sort: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TierListResponse {
    pub data: Vec<Tier>,
    pub page: u32,
}

// -- Votes & Comments --

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub tier_id: i64,
    pub vote_type: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub tier_id: i64,
    #[serde(default)]
    pub content: String,
}

/// `tier_id` is kept as text so a malformed value can be reported as a
/// bad request rather than a rejected query string.
#[derive(Debug, Default, Deserialize)]
pub struct CommentQuery {
    pub tier_id: Option<String>,
}

// -- Misc --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
