//! Member API handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::AppState;
use crate::db::repository::{member, streak as streak_repo};
use crate::progression::ledger::{self, LedgerReceipt};
use crate::progression::referral;
use crate::utils::{AppError, AppResult};
use shared::models::{BalanceBreakdown, Member, MemberCreate, Streak};
use shared::util::now_millis;

#[derive(Deserialize, Validate)]
pub struct CreateMemberBody {
    #[validate(length(min = 1, max = 120))]
    pub display_name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub referred_by_id: Option<i64>,
}

/// POST /api/members - register a member
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateMemberBody>,
) -> AppResult<Json<Member>> {
    body.validate()?;
    let member = member::create(
        &state.pool,
        &MemberCreate {
            display_name: body.display_name,
            email: body.email,
            referred_by_id: body.referred_by_id,
        },
    )
    .await?;
    Ok(Json(member))
}

/// Member detail response (member + live balance + streak)
#[derive(Serialize)]
pub struct MemberDetail {
    #[serde(flatten)]
    pub member: Member,
    pub balance: BalanceBreakdown,
    pub streak: Option<Streak>,
}

/// GET /api/members/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<MemberDetail>> {
    let member = member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("member {id}")))?;
    let balance = ledger::balance(&state.pool, id).await?;
    let streak = streak_repo::find_by_member(&state.pool, id).await?;
    Ok(Json(MemberDetail {
        member,
        balance,
        streak,
    }))
}

#[derive(Serialize)]
pub struct ActivateResponse {
    /// Credit granted to the referrer, when one exists.
    pub referral_award: Option<LedgerReceipt>,
}

/// POST /api/members/{id}/activate - mark active and attribute the referral
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ActivateResponse>> {
    member::mark_active(&state.pool, id, now_millis()).await?;
    let referral_award = referral::on_member_activated(&state.pool, id).await?;
    Ok(Json(ActivateResponse { referral_award }))
}
