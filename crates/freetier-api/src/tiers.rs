use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use freetier_db::models::{NewTier, TierFilter, TierPatch, TierSort};
use freetier_types::api::{
    CreateTierRequest, MessageResponse, TierListQuery, TierListResponse, UpdateTierRequest,
};
use freetier_types::models::{Tier, TierDetail};

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::{AppState, blocking, convert};

pub async fn create_tier(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateTierRequest>,
) -> Result<impl IntoResponse> {
    let platform = req.platform.trim().to_string();
    let name = req.name.trim().to_string();
    if platform.is_empty() || name.is_empty() {
        return Err(AppError::BadRequest("platform and name are required".into()));
    }

    let new_tier = NewTier {
        platform,
        name,
        description: req.description,
        is_public: req.is_public,
        cpu_limit: req.cpu_limit,
        memory_limit: req.memory_limit,
        storage_limit: req.storage_limit,
        bandwidth_limit: req.bandwidth_limit,
        monthly_hours: req.monthly_hours,
        url: req.url,
    };
    let tier = blocking(&state, move |db| db.create_tier(auth.user_id, &new_tier)).await?;

    info!(tier_id = tier.id, platform = %tier.platform, user_id = auth.user_id, "Tier created");
    Ok((StatusCode::CREATED, Json(convert::tier(tier))))
}

pub async fn list_tiers(
    State(state): State<AppState>,
    Query(query): Query<TierListQuery>,
) -> Result<Json<TierListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let filter = TierFilter {
        platform: query.platform.filter(|p| !p.is_empty()),
        user_id: query.user_id,
        sort: match query.sort.as_deref() {
            Some("recent") => TierSort::Recent,
            _ => TierSort::TopVoted,
        },
        page,
    };

    let rows = blocking(&state, move |db| db.list_tiers(&filter)).await?;
    Ok(Json(TierListResponse {
        data: rows.into_iter().map(convert::tier).collect(),
        page,
    }))
}

pub async fn get_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<i64>,
) -> Result<Json<TierDetail>> {
    let (tier, comments) = blocking(&state, move |db| -> Result<_> {
        let tier = db
            .get_tier(tier_id)?
            .ok_or_else(|| AppError::NotFound(format!("tier {tier_id}")))?;
        let comments = db.list_comments(tier_id)?;
        Ok((tier, comments))
    })
    .await?;

    Ok(Json(TierDetail {
        tier: convert::tier(tier),
        comments: comments.into_iter().map(convert::comment_with_author).collect(),
    }))
}

pub async fn update_tier(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(tier_id): Path<i64>,
    Json(req): Json<UpdateTierRequest>,
) -> Result<Json<Tier>> {
    let required = |value: Option<String>, field: &str| -> Result<Option<String>> {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if v.is_empty() => Err(AppError::BadRequest(format!("{field} cannot be empty"))),
            other => Ok(other),
        }
    };

    let patch = TierPatch {
        platform: required(req.platform, "platform")?,
        name: required(req.name, "name")?,
        description: req.description,
        is_public: req.is_public,
        cpu_limit: req.cpu_limit,
        memory_limit: req.memory_limit,
        storage_limit: req.storage_limit,
        bandwidth_limit: req.bandwidth_limit,
        monthly_hours: req.monthly_hours,
        url: req.url,
    };

    let tier = blocking(&state, move |db| -> Result<_> {
        let existing = db
            .get_tier(tier_id)?
            .ok_or_else(|| AppError::NotFound(format!("tier {tier_id}")))?;
        if existing.user_id != auth.user_id {
            return Err(AppError::Forbidden("only the owner can edit this tier".into()));
        }
        db.update_tier(tier_id, &patch)?
            .ok_or_else(|| AppError::NotFound(format!("tier {tier_id}")))
    })
    .await?;

    info!(tier_id, user_id = auth.user_id, "Tier updated");
    Ok(Json(convert::tier(tier)))
}

pub async fn delete_tier(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(tier_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let policy = state.cascade;
    blocking(&state, move |db| -> Result<_> {
        let existing = db
            .get_tier(tier_id)?
            .ok_or_else(|| AppError::NotFound(format!("tier {tier_id}")))?;
        if existing.user_id != auth.user_id {
            return Err(AppError::Forbidden("only the owner can delete this tier".into()));
        }
        Ok(db.delete_tier(tier_id, policy)?)
    })
    .await?;

    Ok(Json(MessageResponse::new("Tier deleted successfully")))
}
