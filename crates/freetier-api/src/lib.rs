pub mod auth;
pub mod comments;
pub mod convert;
pub mod error;
pub mod github;
pub mod middleware;
pub mod routes;
pub mod tiers;
pub mod tokens;
pub mod users;
pub mod votes;

use std::sync::Arc;

use freetier_db::{CascadePolicy, Database};
use tracing::error;

use crate::error::AppError;

pub use routes::create_router;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Signs access and refresh tokens.
    pub jwt_secret: String,
    /// Signs session cookies and OAuth state.
    pub session_secret: String,
    /// `None` disables the GitHub login routes.
    pub github: Option<GithubConfig>,
    pub cascade: CascadePolicy,
    /// Mark cookies `Secure`. Off only for plain-HTTP local development.
    pub secure_cookies: bool,
    pub http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, session_secret: String) -> Self {
        Self {
            db,
            jwt_secret,
            session_secret,
            github: None,
            cascade: CascadePolicy::default(),
            secure_cookies: true,
            http: reqwest::Client::new(),
        }
    }
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T, E>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db).map_err(Into::into))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Internal(anyhow::anyhow!("blocking task failed: {e}"))
        })?
}
