//! GitHub OAuth login.

use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use freetier_db::models::GithubIdentity;
use freetier_types::api::{AuthResponse, TokenKind};

use crate::auth::session_cookie;
use crate::error::{AppError, Result};
use crate::{AppState, GithubConfig, blocking, convert, tokens};

type HmacSha256 = Hmac<Sha256>;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const USER_AGENT: &str = "freetier";

/// How long a signed OAuth state stays valid.
const STATE_TTL_MS: i64 = 10 * 60 * 1000;

/// Holds the nonce of the state issued to this browser. Session-scoped; the
/// signed state carries its own expiry.
const OAUTH_STATE_COOKIE: &str = "freetier_oauth_state";
const STATE_COOKIE_PATH: &str = "/auth/github";

fn github_config(state: &AppState) -> Result<&GithubConfig> {
    state
        .github
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("GitHub login is not configured".into()))
}

/// Sign a timestamped nonce: base64url("ts_hex|nonce_hex|sig_hex").
/// Returns the state and its nonce.
fn sign_state(key: &[u8], now_ms: i64) -> Result<(String, String)> {
    let nonce = hex::encode(rand::random::<[u8; 16]>());
    let payload = format!("{:x}|{}", now_ms, nonce);

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok((URL_SAFE_NO_PAD.encode(signed.as_bytes()), nonce))
}

/// Check the signature and that the state was issued within the last
/// [`STATE_TTL_MS`]. Returns the state's nonce.
fn verify_state(state: &str, key: &[u8], now_ms: i64) -> Option<String> {
    let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(state).ok()?).ok()?;
    let (payload, signature_hex) = decoded.rsplit_once('|')?;
    let signature = hex::decode(signature_hex).ok()?;

    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).ok()?;

    let (ts, nonce) = payload.split_once('|')?;
    let age = now_ms - i64::from_str_radix(ts, 16).ok()?;
    (0..=STATE_TTL_MS).contains(&age).then(|| nonce.to_string())
}

/// A valid state must also carry the nonce this browser was given at login.
fn state_matches_cookie(nonce: &str, jar: &CookieJar) -> bool {
    jar.get(OAUTH_STATE_COOKIE)
        .is_some_and(|c| !nonce.is_empty() && c.value() == nonce)
}

fn state_cookie(nonce: String, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, nonce))
        .path(STATE_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        // GitHub's redirect back is a top-level GET, which Lax allows
        .same_site(SameSite::Lax)
        .build()
}

/// Start OAuth: remember the state's nonce in a cookie and redirect to
/// GitHub's consent page.
pub async fn github_login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let config = github_config(&state)?;
    let (oauth_state, nonce) =
        sign_state(state.session_secret.as_bytes(), Utc::now().timestamp_millis())?;

    let url = reqwest::Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.callback_url.as_str()),
            ("scope", "read:user user:email"),
            ("state", oauth_state.as_str()),
        ],
    )
    .map_err(|e| AppError::Internal(e.into()))?;

    info!(client_id = %config.client_id, "Starting OAuth flow, redirecting to GitHub");
    Ok((
        jar.add(state_cookie(nonce, state.secure_cookies)),
        Redirect::temporary(url.as_str()),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubTokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// OAuth callback: exchange the code, find or create the user, set the
/// session cookie.
pub async fn github_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let config = github_config(&state)?.clone();

    if let Some(error) = params.error {
        warn!(error = %error, "OAuth error from GitHub");
        return Err(AppError::BadRequest(format!("GitHub authorization failed: {error}")));
    }

    let oauth_state = params.state.unwrap_or_default();
    let Some(nonce) =
        verify_state(&oauth_state, state.session_secret.as_bytes(), Utc::now().timestamp_millis())
    else {
        warn!("Invalid, expired or tampered OAuth state");
        return Err(AppError::BadRequest("invalid OAuth state".into()));
    };
    if !state_matches_cookie(&nonce, &jar) {
        warn!("OAuth state was not issued to this browser");
        return Err(AppError::BadRequest("OAuth state does not match this browser".into()));
    }
    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path(STATE_COOKIE_PATH));

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing authorization code".into()))?;

    let token = exchange_code(&state.http, &config, &code).await?;
    let github_user = fetch_user(&state.http, &token.access_token).await?;

    let identity = GithubIdentity {
        github_id: github_user.id.to_string(),
        email: github_user
            .email
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", github_user.login)),
        username: github_user.login.clone(),
        login: github_user.login,
        avatar_url: github_user.avatar_url.unwrap_or_default(),
        access_token: token.access_token,
        refresh_token: token.refresh_token,
    };

    let jwt_secret = state.jwt_secret.clone();
    let session_secret = state.session_secret.clone();
    let (user, created, tokens, session) = blocking(&state, move |db| -> Result<_> {
        let (user, created) = db.upsert_github_user(&identity)?;
        let tokens = tokens::issue_pair(&jwt_secret, &user)?;
        let session = tokens::create_token(&session_secret, &user, TokenKind::Session)?;
        Ok((user, created, tokens, session))
    })
    .await?;

    info!(user_id = user.id, created, "GitHub login");

    Ok((
        jar.add(session_cookie(session, state.secure_cookies)),
        Json(AuthResponse {
            message: "GitHub login successful".into(),
            user: convert::user(user),
            tokens,
        }),
    ))
}

struct ExchangedToken {
    access_token: String,
    refresh_token: String,
}

async fn exchange_code(
    http: &reqwest::Client,
    config: &GithubConfig,
    code: &str,
) -> Result<ExchangedToken> {
    let response: GithubTokenResponse = http
        .post(TOKEN_URL)
        .header(reqwest::header::ACCEPT, "application/json")
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.callback_url.as_str()),
        ])
        .send()
        .await
        .map_err(|e| AppError::Github(format!("token exchange failed: {e}")))?
        .error_for_status()
        .map_err(|e| AppError::Github(format!("token exchange failed: {e}")))?
        .json()
        .await
        .map_err(|e| AppError::Github(format!("malformed token response: {e}")))?;

    let access_token = response.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
        AppError::BadRequest(format!(
            "GitHub rejected the authorization code: {}",
            response.error_description.unwrap_or_default()
        ))
    })?;

    Ok(ExchangedToken {
        access_token,
        refresh_token: response.refresh_token.unwrap_or_default(),
    })
}

async fn fetch_user(http: &reqwest::Client, access_token: &str) -> Result<GithubUser> {
    http.get(USER_URL)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .map_err(|e| AppError::Github(format!("user fetch failed: {e}")))?
        .error_for_status()
        .map_err(|e| AppError::Github(format!("user fetch failed: {e}")))?
        .json()
        .await
        .map_err(|e| AppError::Github(format!("malformed user response: {e}")))
}
