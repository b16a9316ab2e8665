use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use freetier_db::{CounterError, VoteOutcome};
use freetier_types::api::{MessageResponse, VoteRequest};

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::{AppState, blocking, convert};

/// Cast, switch or withdraw the caller's vote on a tier.
///
/// Voting again with the same type removes the vote; voting with the other
/// type switches it.
pub async fn vote_tier(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<VoteRequest>,
) -> Result<Response> {
    let vote_type = i8::try_from(req.vote_type).map_err(|_| {
        AppError::BadRequest("vote_type must be 1 (upvote) or -1 (downvote)".into())
    })?;
    let tier_id = req.tier_id;
    let user_id = auth.user_id;

    let outcome = blocking(&state, move |db| -> Result<_> {
        if db.get_tier(tier_id)?.is_none() {
            return Err(AppError::NotFound(format!("tier {tier_id}")));
        }

        Ok(retry_on_conflict(|| db.apply_vote(user_id, tier_id, vote_type))?)
    })
    .await?;

    debug!(user_id, tier_id, ?outcome, "Vote applied");

    let response = match outcome {
        VoteOutcome::Created(vote) => {
            (StatusCode::CREATED, Json(convert::vote(vote))).into_response()
        }
        VoteOutcome::Updated(vote) => (StatusCode::OK, Json(convert::vote(vote))).into_response(),
        VoteOutcome::Removed => {
            (StatusCode::OK, Json(MessageResponse::new("Vote removed"))).into_response()
        }
    };
    Ok(response)
}

/// Run `attempt`, running it once more if it lost a unique-index race to a
/// concurrent first vote for the same pair. The retry sees the winner's vote.
fn retry_on_conflict<T>(
    mut attempt: impl FnMut() -> std::result::Result<T, CounterError>,
) -> std::result::Result<T, CounterError> {
    match attempt() {
        Err(err) if err.is_conflict() => {
            warn!(error = %err, "Vote conflict, retrying once");
            attempt()
        }
        other => other,
    }
}
