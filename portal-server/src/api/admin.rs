//! Admin back-office API handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::core::AppState;
use crate::db::repository::{RepoError, audit, org_setting};
use crate::progression::advancement::{self, ManualAdvance, ReviewRequest};
use crate::utils::AppResult;
use shared::models::{
    AdvancementMode, AdvancementRequest, Member, MembershipRole, Milestone, PendingRequestView,
};
use shared::util::now_millis;

/// GET /api/admin/advancement-requests
pub async fn pending_requests(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PendingRequestView>>> {
    Ok(Json(advancement::pending_requests(&state.pool).await?))
}

#[derive(Deserialize)]
pub struct ReviewBody {
    pub admin_id: i64,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

/// POST /api/admin/advancement-requests/{id}/review - one-shot
pub async fn review_request(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ReviewBody>,
) -> AppResult<Json<AdvancementRequest>> {
    let processed = advancement::process_request(
        &state.pool,
        &ReviewRequest {
            request_id: id,
            admin_id: body.admin_id,
            approved: body.approved,
            rejection_reason: body.rejection_reason,
        },
    )
    .await?;
    Ok(Json(processed))
}

#[derive(Deserialize)]
pub struct ManualAdvanceBody {
    pub to_role: MembershipRole,
    pub admin_id: i64,
    pub reason: Option<String>,
    #[serde(default)]
    pub allow_demotion: bool,
}

/// POST /api/admin/members/{id}/advance - eligibility-bypassing override
pub async fn manual_advance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ManualAdvanceBody>,
) -> AppResult<Json<Member>> {
    let member = advancement::manually_advance(
        &state.pool,
        &ManualAdvance {
            member_id: id,
            to_role: body.to_role,
            admin_id: body.admin_id,
            reason: body.reason,
            allow_demotion: body.allow_demotion,
        },
    )
    .await?;
    Ok(Json(member))
}

#[derive(Deserialize)]
pub struct RecentParams {
    pub limit: Option<i64>,
}

/// GET /api/admin/advancements/recent
pub async fn recent_advancements(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> AppResult<Json<Vec<Milestone>>> {
    let rows = advancement::recent_advancements(&state.pool, params.limit.unwrap_or(20)).await?;
    Ok(Json(rows))
}

#[derive(Serialize)]
pub struct ModeResponse {
    pub mode: AdvancementMode,
}

/// GET /api/admin/settings/advancement-mode
pub async fn get_advancement_mode(State(state): State<AppState>) -> AppResult<Json<ModeResponse>> {
    let mode = org_setting::advancement_mode(&state.pool).await?;
    Ok(Json(ModeResponse { mode }))
}

#[derive(Deserialize)]
pub struct ModeBody {
    pub admin_id: i64,
    pub mode: AdvancementMode,
}

/// PUT /api/admin/settings/advancement-mode
pub async fn set_advancement_mode(
    State(state): State<AppState>,
    Json(body): Json<ModeBody>,
) -> AppResult<Json<ModeResponse>> {
    org_setting::set(&state.pool, org_setting::ADVANCEMENT_MODE, body.mode.as_str()).await?;
    let mut conn = state.pool.acquire().await.map_err(RepoError::from)?;
    audit::log(
        &mut conn,
        &audit::NewAuditEntry {
            actor_id: body.admin_id,
            action: "org_setting.advancement_mode",
            subject_type: "org_setting",
            subject_id: org_setting::ADVANCEMENT_MODE.to_string(),
            detail: Some(serde_json::json!({ "mode": body.mode })),
        },
        now_millis(),
    )
    .await?;
    tracing::info!(admin_id = body.admin_id, mode = %body.mode.as_str(), "advancement mode changed");
    Ok(Json(ModeResponse { mode: body.mode }))
}

#[derive(Deserialize)]
pub struct AuditParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/admin/audit - paginated audit log
pub async fn audit_log(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> AppResult<Json<Vec<audit::AuditEntry>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);
    Ok(Json(audit::query(&state.pool, limit, offset).await?))
}
