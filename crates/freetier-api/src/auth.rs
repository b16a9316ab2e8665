use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{info, warn};

use freetier_db::Database;
use freetier_db::models::{NewUser, UserRow};
use freetier_types::api::{
    AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest, TokenKind,
    TokenResponse,
};
use freetier_types::models::User;

use crate::error::{AppError, Result};
use crate::middleware::{AuthUser, SESSION_COOKIE};
use crate::{AppState, blocking, convert, tokens};

pub const MIN_PASSWORD_CHARS: usize = 6;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "username, email and password are required".into(),
        ));
    }
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }

    let secret = state.jwt_secret.clone();
    let (user, tokens) = blocking(&state, move |db| -> Result<_> {
        if db.user_exists(&email, &username)? {
            return Err(AppError::Conflict(
                "user with this email or username already exists".into(),
            ));
        }

        // Hash password with Argon2id
        let password_hash = hash_password(&req.password)?;
        let user = db.create_user(&NewUser {
            username,
            email,
            password_hash: Some(password_hash),
        })?;
        let tokens = tokens::issue_pair(&secret, &user)?;
        Ok((user, tokens))
    })
    .await?;

    info!(user_id = user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".into(),
            user: convert::user(user),
            tokens,
        }),
    ))
}

/// The first identifier present in a login request, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoginIdentifier {
    Email(String),
    Username(String),
    GithubId(String),
}

impl LoginIdentifier {
    fn from_request(req: &LoginRequest) -> Option<Self> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        }

        present(&req.email)
            .map(Self::Email)
            .or_else(|| present(&req.username).map(Self::Username))
            .or_else(|| present(&req.github_id).map(Self::GithubId))
    }

    fn lookup(&self, db: &Database) -> anyhow::Result<Option<UserRow>> {
        match self {
            Self::Email(email) => db.get_user_by_email(email),
            Self::Username(username) => db.get_user_by_username(username),
            Self::GithubId(github_id) => db.get_user_by_github_id(github_id),
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let identifier = LoginIdentifier::from_request(&req).ok_or_else(|| {
        AppError::BadRequest("email, username or github_id is required".into())
    })?;

    let secret = state.jwt_secret.clone();
    let (user, tokens) = blocking(&state, move |db| -> Result<_> {
        let user = identifier
            .lookup(db)?
            .ok_or(AppError::InvalidCredentials)?;

        if let Some(hash) = user.password_hash() {
            let password = req
                .password
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AppError::BadRequest("password is required".into()))?;
            if !verify_password(hash, password)? {
                warn!(user_id = user.id, "Failed login attempt");
                return Err(AppError::InvalidCredentials);
            }
        }

        let tokens = tokens::issue_pair(&secret, &user)?;
        Ok((user, tokens))
    })
    .await?;

    info!(user_id = user.id, "User logged in");

    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        user: convert::user(user),
        tokens,
    }))
}

/// Exchange a refresh token for a new token pair.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>> {
    let claims = tokens::verify(&state.jwt_secret, &req.refresh_token, TokenKind::Refresh)?;

    let secret = state.jwt_secret.clone();
    let tokens = blocking(&state, move |db| -> Result<_> {
        let user = db
            .get_user_by_id(claims.user_id)?
            .ok_or(AppError::InvalidToken)?;
        Ok(tokens::issue_pair(&secret, &user)?)
    })
    .await?;

    Ok(Json(tokens))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<User>> {
    let user = blocking(&state, move |db| db.get_user_by_id(auth.user_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", auth.user_id)))?;

    Ok(Json(convert::user(user)))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(MessageResponse::new("Logged out successfully")))
}

/// Session cookie carrying a signed session token. Expiry is enforced by the
/// token itself.
pub(crate) fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

fn verify_password(hash: &str, password: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("corrupt password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_request(email: &str, username: &str, github_id: &str) -> LoginRequest {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        LoginRequest {
            email: opt(email),
            username: opt(username),
            github_id: opt(github_id),
            password: None,
        }
    }

    #[test]
    fn login_identifier_priority() {
        assert_eq!(
            LoginIdentifier::from_request(&login_request("a@example.com", "alice", "99")),
            Some(LoginIdentifier::Email("a@example.com".into()))
        );
        assert_eq!(
            LoginIdentifier::from_request(&login_request("", "alice", "99")),
            Some(LoginIdentifier::Username("alice".into()))
        );
        assert_eq!(
            LoginIdentifier::from_request(&login_request("  ", "", "99")),
            Some(LoginIdentifier::GithubId("99".into()))
        );
        assert_eq!(LoginIdentifier::from_request(&login_request("", "", "")), None);
    }

    #[test]
    fn session_cookie_is_http_only_and_secure_when_asked() {
        let cookie = session_cookie("token".into(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));

        let local = session_cookie("token".into(), false);
        assert_ne!(local.secure(), Some(true));
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password(&hash, "hunter22").unwrap());
        assert!(!verify_password(&hash, "hunter23").unwrap());
        assert!(verify_password("not-a-phc-string", "x").is_err());
    }
}
