//! Points ledger models

use serde::{Deserialize, Serialize};

/// Category of a ledger transaction. Stored as snake_case TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum TransactionKind {
    EarnTask,
    EarnVote,
    EarnReferral,
    EarnLoginStreak,
    SpendMarketplace,
    ManualAdjustment,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::EarnTask => "earn_task",
            TransactionKind::EarnVote => "earn_vote",
            TransactionKind::EarnReferral => "earn_referral",
            TransactionKind::EarnLoginStreak => "earn_login_streak",
            TransactionKind::SpendMarketplace => "spend_marketplace",
            TransactionKind::ManualAdjustment => "manual_adjustment",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable row of the append-only points ledger.
///
/// `(member_id, reference_type, reference_id, kind)` is unique — the
/// idempotency key that keeps a replayed external event from crediting twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PointsTransaction {
    pub id: i64,
    pub member_id: i64,
    /// Signed: positive = earn, negative = spend.
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference_type: String,
    pub reference_id: String,
    pub description: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

/// Balance derived from the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBreakdown {
    /// Spendable points right now (unexpired, FIFO-net of spends).
    pub total: i64,
    /// Net of transactions created in the current UTC calendar year.
    pub current_year: i64,
    /// Portion of `total` expiring within the next 30 days.
    pub expiring_soon: i64,
    /// Earliest upcoming expiry among still-funded earn lots.
    pub expiration_date: Option<i64>,
}
