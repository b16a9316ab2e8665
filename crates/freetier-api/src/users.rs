use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use freetier_db::models::NewUser;
use freetier_types::api::CreateUserRequest;
use freetier_types::models::User;

use crate::error::{AppError, Result};
use crate::{AppState, blocking, convert};

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let rows = blocking(&state, |db| db.list_users()).await?;
    Ok(Json(rows.into_iter().map(convert::user).collect()))
}

/// Create a user without credentials. Such an account can only sign in
/// once a password or GitHub identity is attached.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    if username.is_empty() || email.is_empty() {
        return Err(AppError::BadRequest("username and email are required".into()));
    }

    let user = blocking(&state, move |db| {
        db.create_user(&NewUser {
            username,
            email,
            password_hash: None,
        })
    })
    .await?;

    info!(user_id = user.id, username = %user.username, "User created");
    Ok((StatusCode::CREATED, Json(convert::user(user))))
}
