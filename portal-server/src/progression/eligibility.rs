//! Eligibility evaluation
//!
//! Pure threshold checks over live stats. Stats are always recomputed from
//! source tables at decision time — the cached counters on the member row
//! are display values and never gate an advancement.

use serde::Serialize;
use shared::models::{Member, RoleRequirement, TransactionKind};
use sqlx::SqliteConnection;

use crate::db::repository::{member as member_repo, points, streak as streak_repo};
use crate::progression::{ProgressionResult, ledger};

const DAY_MS: i64 = 86_400_000;

/// Live stats recomputed from source tables.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemberStats {
    pub points: i64,
    pub referrals: i64,
    pub tasks_completed: i64,
    pub tenure_days: i64,
    pub current_streak: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaProgress {
    pub current: i64,
    pub required: i64,
}

impl QuotaProgress {
    fn of(current: i64, required: i64) -> Self {
        Self { current, required }
    }

    /// A threshold of 0 (or unset) is automatically satisfied.
    pub fn is_met(self) -> bool {
        self.required <= 0 || self.current >= self.required
    }
}

/// Partial progress toward a role, always populated — callers render it even
/// when the member is not eligible.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequirementProgress {
    pub points: QuotaProgress,
    pub referrals: QuotaProgress,
    pub tasks: QuotaProgress,
    pub tenure_days: QuotaProgress,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Evaluation {
    pub is_eligible: bool,
    pub progress: RequirementProgress,
}

/// All configured thresholds must be met (AND semantics).
pub fn evaluate(stats: &MemberStats, requirement: &RoleRequirement) -> Evaluation {
    let progress = RequirementProgress {
        points: QuotaProgress::of(stats.points, requirement.points_required),
        referrals: QuotaProgress::of(stats.referrals, requirement.referrals_required),
        tasks: QuotaProgress::of(stats.tasks_completed, requirement.tasks_required),
        tenure_days: QuotaProgress::of(stats.tenure_days, requirement.tenure_days_required),
    };
    let is_eligible = progress.points.is_met()
        && progress.referrals.is_met()
        && progress.tasks.is_met()
        && progress.tenure_days.is_met();
    Evaluation {
        is_eligible,
        progress,
    }
}

/// Recompute stats from source tables, inside the caller's transaction.
pub(crate) async fn recompute_stats(
    conn: &mut SqliteConnection,
    member: &Member,
    now: i64,
) -> ProgressionResult<MemberStats> {
    let transactions = points::all_for_member(conn, member.id).await?;
    let balance = ledger::compute_balance(&transactions, now);
    let referrals = member_repo::count_referred_active(conn, member.id).await?;
    let tasks_completed = points::count_by_kind(conn, member.id, TransactionKind::EarnTask).await?;
    let tenure_days = ((now - member.created_at) / DAY_MS).max(0);
    let current_streak = streak_repo::get_tx(conn, member.id)
        .await?
        .map_or(0, |s| s.current_streak);
    Ok(MemberStats {
        points: balance.total,
        referrals,
        tasks_completed,
        tenure_days,
        current_streak,
    })
}
