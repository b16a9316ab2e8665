//! JWT issuance and verification.
//!
//! Access and refresh tokens are signed with the JWT secret; session tokens
//! (the cookie set by GitHub login) with the session secret. Every token
//! carries a `kind` and is rejected anywhere else.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use freetier_db::models::UserRow;
use freetier_types::api::{Claims, TokenKind, TokenResponse};

use crate::error::AppError;

pub const ISSUER: &str = "freetier";

/// Lifetimes in seconds.
pub const ACCESS_TTL_SECS: i64 = 24 * 60 * 60;
pub const REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

fn ttl(kind: TokenKind) -> Duration {
    Duration::seconds(match kind {
        TokenKind::Access => ACCESS_TTL_SECS,
        TokenKind::Refresh => REFRESH_TTL_SECS,
        TokenKind::Session => SESSION_TTL_SECS,
    })
}

pub fn create_token(secret: &str, user: &UserRow, kind: TokenKind) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        user_id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        iss: ISSUER.to_string(),
        iat: now.timestamp(),
        nbf: now.timestamp(),
        exp: (now + ttl(kind)).timestamp(),
        kind,
        jti: (kind == TokenKind::Refresh).then(|| Uuid::new_v4().to_string()),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Issue a fresh access/refresh pair.
pub fn issue_pair(secret: &str, user: &UserRow) -> anyhow::Result<TokenResponse> {
    Ok(TokenResponse {
        access_token: create_token(secret, user, TokenKind::Access)?,
        refresh_token: create_token(secret, user, TokenKind::Refresh)?,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TTL_SECS,
    })
}

/// Decode `token` and check its signature, issuer, time window and kind.
pub fn verify(secret: &str, token: &str, expected: TokenKind) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_nbf = true;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::InvalidToken)?
    .claims;

    if claims.kind != expected {
        return Err(AppError::InvalidToken);
    }
    Ok(claims)
}
