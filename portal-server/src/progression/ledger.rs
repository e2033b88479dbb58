//! Points ledger
//!
//! Append-only transactions; balances derived from the log by FIFO lot
//! consumption. Earn transactions form lots in creation order and spends
//! consume the oldest lot still valid at the time of the spend, so an
//! expiration policy combined with arbitrary spends resolves to one
//! unambiguous, auditable rule.

use serde::Serialize;
use shared::models::{BalanceBreakdown, PointsTransaction, TransactionKind};
use shared::util::now_millis;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::repository::{RepoError, member as member_repo, points};
use crate::progression::{ProgressionError, ProgressionResult, member_not_found, with_retry};

/// Points expiring within this window count as "expiring soon".
const EXPIRING_SOON_WINDOW_MS: i64 = 30 * 86_400_000;

#[derive(Debug, Clone)]
pub struct AwardPoints {
    pub member_id: i64,
    /// Positive number of points to credit.
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference_type: String,
    pub reference_id: String,
    pub description: String,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SpendPoints {
    pub member_id: i64,
    /// Positive number of points to debit.
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference_type: String,
    pub reference_id: String,
    pub description: String,
}

/// Result of an award or spend. `duplicate` marks an idempotency-key replay
/// that resolved to the previously written row — a success, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerReceipt {
    pub transaction: PointsTransaction,
    pub duplicate: bool,
}

/// Credit points, idempotently per `(member, reference, kind)`.
pub async fn award(pool: &SqlitePool, cmd: &AwardPoints) -> ProgressionResult<LedgerReceipt> {
    with_retry(|| async move {
        let mut tx = pool.begin().await.map_err(RepoError::from)?;
        let receipt = award_tx(&mut tx, cmd).await?;
        tx.commit().await.map_err(RepoError::from)?;
        Ok(receipt)
    })
    .await
}

/// Award inside an existing transaction (used by the referral and streak
/// flows so their credit lands atomically with their own writes).
pub(crate) async fn award_tx(
    conn: &mut SqliteConnection,
    cmd: &AwardPoints,
) -> ProgressionResult<LedgerReceipt> {
    if cmd.amount <= 0 {
        return Err(ProgressionError::InvalidAmount(cmd.amount));
    }
    let now = now_millis();
    member_repo::touch_for_update(conn, cmd.member_id)
        .await
        .map_err(member_not_found(cmd.member_id))?;

    let new_tx = points::NewTransaction {
        member_id: cmd.member_id,
        amount: cmd.amount,
        kind: cmd.kind,
        reference_type: &cmd.reference_type,
        reference_id: &cmd.reference_id,
        description: &cmd.description,
        expires_at: cmd.expires_at,
    };
    match points::insert(conn, &new_tx, now).await? {
        Some(transaction) => {
            member_repo::adjust_points_cache(conn, cmd.member_id, cmd.amount, now).await?;
            tracing::info!(
                member_id = cmd.member_id,
                amount = cmd.amount,
                kind = %cmd.kind,
                "points awarded"
            );
            Ok(LedgerReceipt {
                transaction,
                duplicate: false,
            })
        }
        None => {
            let existing = find_existing(conn, cmd.member_id, &cmd.reference_type, &cmd.reference_id, cmd.kind).await?;
            Ok(LedgerReceipt {
                transaction: existing,
                duplicate: true,
            })
        }
    }
}

/// Debit points. Fails closed with `InsufficientBalance` when the live
/// balance does not cover the amount.
pub async fn spend(pool: &SqlitePool, cmd: &SpendPoints) -> ProgressionResult<LedgerReceipt> {
    if cmd.amount <= 0 {
        return Err(ProgressionError::InvalidAmount(cmd.amount));
    }
    with_retry(|| async move {
        let mut tx = pool.begin().await.map_err(RepoError::from)?;
        member_repo::touch_for_update(&mut tx, cmd.member_id)
            .await
            .map_err(member_not_found(cmd.member_id))?;

        // A replayed spend returns the prior row without re-checking balance.
        if let Some(existing) = points::find_by_reference(
            &mut tx,
            cmd.member_id,
            &cmd.reference_type,
            &cmd.reference_id,
            cmd.kind,
        )
        .await?
        {
            tx.commit().await.map_err(RepoError::from)?;
            return Ok(LedgerReceipt {
                transaction: existing,
                duplicate: true,
            });
        }

        let now = now_millis();
        let transactions = points::all_for_member(&mut tx, cmd.member_id).await?;
        let balance = compute_balance(&transactions, now);
        if balance.total < cmd.amount {
            return Err(ProgressionError::InsufficientBalance {
                requested: cmd.amount,
                available: balance.total,
            });
        }

        let new_tx = points::NewTransaction {
            member_id: cmd.member_id,
            amount: -cmd.amount,
            kind: cmd.kind,
            reference_type: &cmd.reference_type,
            reference_id: &cmd.reference_id,
            description: &cmd.description,
            expires_at: None,
        };
        let transaction = match points::insert(&mut tx, &new_tx, now).await? {
            Some(t) => t,
            // Unreachable under the row lock, but resolve like any replay.
            None => {
                find_existing(&mut tx, cmd.member_id, &cmd.reference_type, &cmd.reference_id, cmd.kind).await?
            }
        };
        member_repo::adjust_points_cache(&mut tx, cmd.member_id, -cmd.amount, now).await?;
        tx.commit().await.map_err(RepoError::from)?;
        tracing::info!(
            member_id = cmd.member_id,
            amount = cmd.amount,
            kind = %cmd.kind,
            "points spent"
        );
        Ok(LedgerReceipt {
            transaction,
            duplicate: false,
        })
    })
    .await
}

/// Live balance, derived from the transaction log (never the cached counter).
pub async fn balance(pool: &SqlitePool, member_id: i64) -> ProgressionResult<BalanceBreakdown> {
    member_repo::find_by_id(pool, member_id)
        .await?
        .ok_or(ProgressionError::MemberNotFound(member_id))?;
    let mut conn = pool.acquire().await.map_err(RepoError::from)?;
    let transactions = points::all_for_member(&mut conn, member_id).await?;
    Ok(compute_balance(&transactions, now_millis()))
}

#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub kind: Option<TransactionKind>,
}

/// Paginated transaction history, newest first.
pub async fn history(
    pool: &SqlitePool,
    member_id: i64,
    query: &HistoryQuery,
) -> ProgressionResult<Vec<PointsTransaction>> {
    member_repo::find_by_id(pool, member_id)
        .await?
        .ok_or(ProgressionError::MemberNotFound(member_id))?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);
    Ok(points::history(pool, member_id, limit, offset, query.kind).await?)
}

async fn find_existing(
    conn: &mut SqliteConnection,
    member_id: i64,
    reference_type: &str,
    reference_id: &str,
    kind: TransactionKind,
) -> ProgressionResult<PointsTransaction> {
    points::find_by_reference(conn, member_id, reference_type, reference_id, kind)
        .await?
        .ok_or_else(|| {
            ProgressionError::Repo(RepoError::NotFound(format!(
                "transaction {reference_type}/{reference_id} for member {member_id}"
            )))
        })
}

struct Lot {
    remaining: i64,
    expires_at: Option<i64>,
}

/// Derive the balance from a member's full ledger (oldest first).
///
/// Earn transactions form lots; each spend consumes the oldest lots still
/// valid at the spend's creation time. An expired lot's unconsumed remainder
/// contributes 0 to the total — expiration discounts only unspent earns.
pub fn compute_balance(transactions: &[PointsTransaction], now: i64) -> BalanceBreakdown {
    let mut lots: Vec<Lot> = Vec::new();
    let mut unfunded_spend: i64 = 0;

    for t in transactions {
        if t.amount > 0 {
            lots.push(Lot {
                remaining: t.amount,
                expires_at: t.expires_at,
            });
        } else if t.amount < 0 {
            let mut to_consume = -t.amount;
            for lot in lots.iter_mut() {
                if to_consume == 0 {
                    break;
                }
                if lot.remaining == 0 {
                    continue;
                }
                if lot.expires_at.is_some_and(|e| e <= t.created_at) {
                    continue;
                }
                let take = lot.remaining.min(to_consume);
                lot.remaining -= take;
                to_consume -= take;
            }
            // The spend-time balance check keeps this at zero; carried so a
            // hand-edited ledger still nets out.
            unfunded_spend += to_consume;
        }
    }

    let mut total = 0;
    let mut expiring_soon = 0;
    let mut expiration_date: Option<i64> = None;
    for lot in &lots {
        if lot.remaining == 0 {
            continue;
        }
        match lot.expires_at {
            Some(e) if e <= now => {}
            Some(e) => {
                total += lot.remaining;
                if e <= now + EXPIRING_SOON_WINDOW_MS {
                    expiring_soon += lot.remaining;
                }
                expiration_date = Some(expiration_date.map_or(e, |d| d.min(e)));
            }
            None => total += lot.remaining,
        }
    }
    total -= unfunded_spend;

    let year_start = utc_year_start(now);
    let current_year = transactions
        .iter()
        .filter(|t| t.created_at >= year_start)
        .map(|t| t.amount)
        .sum();

    BalanceBreakdown {
        total,
        current_year,
        expiring_soon,
        expiration_date,
    }
}

fn utc_year_start(now: i64) -> i64 {
    use chrono::{Datelike, TimeZone, Utc};
    chrono::DateTime::from_timestamp_millis(now)
        .and_then(|dt| Utc.with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0).single())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(i64::MIN)
}
