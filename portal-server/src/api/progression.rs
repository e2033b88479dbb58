//! Progression API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::core::AppState;
use crate::db::repository::org_setting;
use crate::progression::advancement::{self, AdvanceOutcome, ProgressionSnapshot};
use crate::progression::streak::{self, StreakUpdate};
use crate::utils::AppResult;
use shared::util::today_utc;

/// GET /api/members/{id}/progression - read-only eligibility snapshot
pub async fn snapshot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ProgressionSnapshot>> {
    let snapshot = advancement::progression_snapshot(&state.pool, &state.catalog, id).await?;
    Ok(Json(snapshot))
}

/// POST /api/members/{id}/progression/check
pub async fn check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AdvanceOutcome>> {
    // Organization policy is read per evaluation, never cached in state, so
    // an admin change applies to the very next check.
    let mode = org_setting::advancement_mode(&state.pool).await?;
    let outcome = advancement::check_and_advance(&state.pool, &state.catalog, mode, id).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize, Default)]
pub struct ActivityBody {
    /// Defaults to today (UTC).
    pub date: Option<NaiveDate>,
}

/// POST /api/members/{id}/activity - record a day of activity
pub async fn record_activity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ActivityBody>>,
) -> AppResult<Json<StreakUpdate>> {
    let date = body.and_then(|b| b.0.date).unwrap_or_else(today_utc);
    let update = streak::record_activity(&state.pool, id, date).await?;
    Ok(Json(update))
}
