//! Membership progression & points ledger engine
//!
//! The one subsystem of the portal with real invariants:
//!
//! - [`ledger`] — append-only points transactions, idempotent per external
//!   event, balances derived by FIFO lot consumption.
//! - [`catalog`] — ordered role requirements, loaded once at startup.
//! - [`eligibility`] — pure threshold evaluation over recomputed stats.
//! - [`advancement`] — the role state machine: automatic advancement,
//!   approval-gated requests, manual admin overrides.
//! - [`referral`] — credits referrers when a referred member activates.
//! - [`streak`] — consecutive-day activity tracking with milestones.
//!
//! Every entry point runs as one SQLite transaction that takes the member
//! row's writer lock first, so concurrent triggers for the same member
//! serialize instead of double-applying.

pub mod advancement;
pub mod catalog;
pub mod eligibility;
pub mod ledger;
pub mod referral;
pub mod streak;

use shared::models::MembershipRole;
use thiserror::Error;

use crate::db::repository::RepoError;

/// Engine error. Business-rule failures are terminal and never retried;
/// only lock-conflict storage errors are retryable.
#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error("member {0} not found")]
    MemberNotFound(i64),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("invalid role transition: {from} -> {to}")]
    InvalidRoleTransition {
        from: MembershipRole,
        to: MembershipRole,
    },

    #[error("advancement request {0} not found")]
    RequestNotFound(i64),

    #[error("advancement request {0} already processed")]
    RequestAlreadyProcessed(i64),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ProgressionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProgressionError::Repo(e) if e.is_retryable())
    }
}

pub type ProgressionResult<T> = Result<T, ProgressionError>;

/// Retry a whole atomic operation on lock conflict, bounded.
///
/// The closure must rebuild its transaction from scratch on every call;
/// business-rule errors pass through on the first occurrence.
pub(crate) async fn with_retry<T, F, Fut>(mut op: F) -> ProgressionResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ProgressionResult<T>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "lock conflict, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(50 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Translate a repository miss on the member row into the engine's
/// member-not-found error.
pub(crate) fn member_not_found(member_id: i64) -> impl Fn(RepoError) -> ProgressionError {
    move |e| match e {
        RepoError::NotFound(_) => ProgressionError::MemberNotFound(member_id),
        other => ProgressionError::Repo(other),
    }
}
