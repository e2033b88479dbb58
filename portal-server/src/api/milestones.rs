//! Milestone API handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::core::AppState;
use crate::db::repository::{member, milestone};
use crate::utils::{AppError, AppResult};
use shared::models::Milestone;

#[derive(Deserialize, Default)]
pub struct ListParams {
    /// Only milestones awaiting acknowledgement.
    #[serde(default)]
    pub uncelebrated: bool,
}

/// GET /api/members/{id}/milestones
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Vec<Milestone>>> {
    member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("member {id}")))?;
    let rows = milestone::list_for_member(&state.pool, id, params.uncelebrated).await?;
    Ok(Json(rows))
}

/// POST /api/milestones/{id}/celebrate - one-shot acknowledgement
pub async fn celebrate(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Milestone>> {
    let flipped = milestone::celebrate(&state.pool, id).await?;
    if !flipped {
        return Err(match milestone::find_by_id(&state.pool, id).await? {
            Some(_) => AppError::Conflict(format!("milestone {id} already celebrated")),
            None => AppError::NotFound(format!("milestone {id}")),
        });
    }
    let row = milestone::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("milestone {id}")))?;
    Ok(Json(row))
}
