//! Points ledger API handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use validator::Validate;

use crate::core::AppState;
use crate::progression::ledger::{self, AwardPoints, HistoryQuery, LedgerReceipt, SpendPoints};
use crate::utils::AppResult;
use shared::models::{BalanceBreakdown, PointsTransaction, TransactionKind};

#[derive(Deserialize, Validate)]
pub struct AwardBody {
    #[validate(range(min = 1))]
    pub amount: i64,
    pub kind: TransactionKind,
    /// Originating entity; omit both for an ad-hoc grant.
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    #[serde(default)]
    pub description: String,
    pub expires_at: Option<i64>,
}

/// POST /api/members/{id}/points/award
///
/// Idempotent per `(reference_type, reference_id, kind)`. Ad-hoc grants
/// without a reference get a fresh UUID, so only callers passing the
/// originating entity get replay protection.
pub async fn award(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AwardBody>,
) -> AppResult<Json<LedgerReceipt>> {
    body.validate()?;
    let reference_type = body.reference_type.unwrap_or_else(|| "manual".into());
    let reference_id = body
        .reference_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let receipt = ledger::award(
        &state.pool,
        &AwardPoints {
            member_id: id,
            amount: body.amount,
            kind: body.kind,
            reference_type,
            reference_id,
            description: body.description,
            expires_at: body.expires_at,
        },
    )
    .await?;
    Ok(Json(receipt))
}

#[derive(Deserialize, Validate)]
pub struct SpendBody {
    #[validate(range(min = 1))]
    pub amount: i64,
    pub kind: TransactionKind,
    /// Required: a spend guards a financial-equivalent resource, so the
    /// caller must identify the originating entity (e.g. the order).
    pub reference_type: String,
    pub reference_id: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/members/{id}/points/spend - fails closed on insufficient balance
pub async fn spend(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SpendBody>,
) -> AppResult<Json<LedgerReceipt>> {
    body.validate()?;
    let receipt = ledger::spend(
        &state.pool,
        &SpendPoints {
            member_id: id,
            amount: body.amount,
            kind: body.kind,
            reference_type: body.reference_type,
            reference_id: body.reference_id,
            description: body.description,
        },
    )
    .await?;
    Ok(Json(receipt))
}

/// GET /api/members/{id}/points/balance
pub async fn balance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<BalanceBreakdown>> {
    Ok(Json(ledger::balance(&state.pool, id).await?))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub kind: Option<TransactionKind>,
}

/// GET /api/members/{id}/points/history
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Vec<PointsTransaction>>> {
    let rows = ledger::history(
        &state.pool,
        id,
        &HistoryQuery {
            limit: params.limit,
            offset: params.offset,
            kind: params.kind,
        },
    )
    .await?;
    Ok(Json(rows))
}
