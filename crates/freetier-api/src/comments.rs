use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use freetier_types::api::{CommentQuery, CreateCommentRequest, MessageResponse};
use freetier_types::models::CommentWithAuthor;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::{AppState, blocking, convert};

/// Live comments on a tier, newest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentQuery>,
) -> Result<Json<Vec<CommentWithAuthor>>> {
    let tier_id: i64 = query
        .tier_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("tier_id is required".into()))?
        .parse()
        .map_err(|_| AppError::BadRequest("tier_id must be an integer".into()))?;

    let rows = blocking(&state, move |db| db.list_comments(tier_id)).await?;
    Ok(Json(rows.into_iter().map(convert::comment_with_author).collect()))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse> {
    let content = req.content.trim().to_string();
    let tier_id = req.tier_id;

    let comment = blocking(&state, move |db| -> Result<_> {
        if db.get_tier(tier_id)?.is_none() {
            return Err(AppError::NotFound(format!("tier {tier_id}")));
        }
        Ok(db.apply_comment(auth.user_id, tier_id, &content)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::comment(comment))))
}

/// Only the author may delete a comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(comment_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    blocking(&state, move |db| -> Result<_> {
        let comment = db
            .get_comment(comment_id)?
            .ok_or_else(|| AppError::NotFound(format!("comment {comment_id}")))?;
        if comment.user_id != auth.user_id {
            return Err(AppError::Forbidden("only the author can delete this comment".into()));
        }
        Ok(db.retract_comment(comment_id)?)
    })
    .await?;

    Ok(Json(MessageResponse::new("Comment deleted successfully")))
}
