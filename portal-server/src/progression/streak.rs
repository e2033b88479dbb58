//! Activity streak tracking
//!
//! One atomic read-modify-write per activity, keyed on the member. Crossing
//! a milestone boundary for the first time awards streak points and emits a
//! milestone; the ledger's idempotency key (`streak/{member}:{threshold}`)
//! makes "first time" exact even across resets.

use chrono::NaiveDate;
use serde::Serialize;
use shared::models::{MilestoneKind, Streak, TransactionKind};
use shared::util::now_millis;
use sqlx::SqlitePool;

use crate::db::repository::{
    RepoError, member as member_repo, milestone as milestone_repo, streak as streak_repo,
};
use crate::progression::ledger::{self, AwardPoints};
use crate::progression::{ProgressionResult, member_not_found, with_retry};

/// Streak lengths that earn a milestone, ascending.
pub const STREAK_MILESTONES: [i64; 3] = [7, 30, 100];

#[derive(Debug, Clone, Serialize)]
pub struct StreakUpdate {
    pub streak: Streak,
    /// Thresholds whose milestone was emitted by this activity.
    pub milestones: Vec<i64>,
}

/// Pure streak transition. `None` means the activity changes nothing
/// (same-day repeat, or an out-of-order date).
///
/// Returns the new state plus the milestone boundaries this step crossed.
pub fn apply_activity(streak: &Streak, activity_date: NaiveDate) -> Option<(Streak, Vec<i64>)> {
    let consecutive = match streak.last_activity_date {
        Some(last) if activity_date <= last => return None,
        Some(last) => last.succ_opt() == Some(activity_date),
        None => false,
    };
    let current = if consecutive {
        streak.current_streak + 1
    } else {
        1
    };
    let next = Streak {
        member_id: streak.member_id,
        current_streak: current,
        longest_streak: streak.longest_streak.max(current),
        total_days: streak.total_days + 1,
        last_activity_date: Some(activity_date),
    };
    let crossed = STREAK_MILESTONES
        .iter()
        .copied()
        .filter(|m| streak.current_streak < *m && current >= *m)
        .collect();
    Some((next, crossed))
}

/// Record one day of activity for a member.
pub async fn record_activity(
    pool: &SqlitePool,
    member_id: i64,
    activity_date: NaiveDate,
) -> ProgressionResult<StreakUpdate> {
    with_retry(|| async move {
        let mut tx = pool.begin().await.map_err(RepoError::from)?;
        member_repo::touch_for_update(&mut tx, member_id)
            .await
            .map_err(member_not_found(member_id))?;

        let current = streak_repo::get_tx(&mut tx, member_id)
            .await?
            .unwrap_or_else(|| Streak::new(member_id));

        let Some((next, crossed)) = apply_activity(&current, activity_date) else {
            return Ok(StreakUpdate {
                streak: current,
                milestones: vec![],
            });
        };
        streak_repo::upsert(&mut tx, &next).await?;

        let now = now_millis();
        let mut emitted = Vec::new();
        for threshold in crossed {
            let receipt = ledger::award_tx(
                &mut tx,
                &AwardPoints {
                    member_id,
                    amount: threshold,
                    kind: TransactionKind::EarnLoginStreak,
                    reference_type: "streak".into(),
                    reference_id: format!("{member_id}:{threshold}"),
                    description: format!("{threshold}-day activity streak"),
                    expires_at: None,
                },
            )
            .await?;
            if receipt.duplicate {
                // Threshold was reached in an earlier streak run.
                continue;
            }
            milestone_repo::insert(
                &mut tx,
                member_id,
                MilestoneKind::StreakMilestone,
                &format!("{threshold}-day streak"),
                &format!("Active {threshold} days in a row"),
                now,
            )
            .await?;
            emitted.push(threshold);
        }

        tx.commit().await.map_err(RepoError::from)?;
        if !emitted.is_empty() {
            tracing::info!(member_id, milestones = ?emitted, "streak milestones reached");
        }
        Ok(StreakUpdate {
            streak: next,
            milestones: emitted,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{member, milestone};
    use crate::db::test_pool;
    use shared::models::MemberCreate;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn streak_state(current: i64, longest: i64, total: i64, last: Option<&str>) -> Streak {
        Streak {
            member_id: 1,
            current_streak: current,
            longest_streak: longest,
            total_days: total,
            last_activity_date: last.map(date),
        }
    }

    // ========== apply_activity (pure) ==========

    #[test]
    fn test_first_activity_starts_streak() {
        let (next, crossed) =
            apply_activity(&streak_state(0, 0, 0, None), date("2026-08-01")).unwrap();
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 1);
        assert_eq!(next.total_days, 1);
        assert!(crossed.is_empty());
    }

    #[test]
    fn test_same_day_is_noop() {
        let state = streak_state(3, 5, 10, Some("2026-08-01"));
        assert!(apply_activity(&state, date("2026-08-01")).is_none());
    }

    #[test]
    fn test_stale_date_is_noop() {
        let state = streak_state(3, 5, 10, Some("2026-08-01"));
        assert!(apply_activity(&state, date("2026-07-30")).is_none());
    }

    #[test]
    fn test_next_day_increments() {
        let state = streak_state(3, 5, 10, Some("2026-08-01"));
        let (next, crossed) = apply_activity(&state, date("2026-08-02")).unwrap();
        assert_eq!(next.current_streak, 4);
        assert_eq!(next.longest_streak, 5);
        assert_eq!(next.total_days, 11);
        assert!(crossed.is_empty());
    }

    #[test]
    fn test_gap_resets_to_one() {
        let state = streak_state(12, 12, 40, Some("2026-08-01"));
        let (next, _) = apply_activity(&state, date("2026-08-04")).unwrap();
        assert_eq!(next.current_streak, 1);
        // Longest survives the reset.
        assert_eq!(next.longest_streak, 12);
        assert_eq!(next.total_days, 41);
    }

    #[test]
    fn test_longest_tracks_new_high() {
        let state = streak_state(12, 12, 40, Some("2026-08-01"));
        let (next, _) = apply_activity(&state, date("2026-08-02")).unwrap();
        assert_eq!(next.longest_streak, 13);
    }

    #[test]
    fn test_crossing_seven_day_boundary() {
        let state = streak_state(6, 6, 6, Some("2026-08-01"));
        let (next, crossed) = apply_activity(&state, date("2026-08-02")).unwrap();
        assert_eq!(next.current_streak, 7);
        assert_eq!(crossed, vec![7]);
    }

    #[test]
    fn test_no_recrossing_below_boundary() {
        // 7 → 8 does not cross 7 again.
        let state = streak_state(7, 7, 7, Some("2026-08-01"));
        let (_, crossed) = apply_activity(&state, date("2026-08-02")).unwrap();
        assert!(crossed.is_empty());
    }

    // ========== record_activity (in-memory db) ==========

    async fn seed_member(pool: &SqlitePool) -> i64 {
        member::create(
            pool,
            &MemberCreate {
                display_name: "Alice".into(),
                email: None,
                referred_by_id: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_record_activity_persists_state() {
        let pool = test_pool().await;
        let id = seed_member(&pool).await;

        let update = record_activity(&pool, id, date("2026-08-01")).await.unwrap();
        assert_eq!(update.streak.current_streak, 1);

        // Same day again: no-op.
        let update = record_activity(&pool, id, date("2026-08-01")).await.unwrap();
        assert_eq!(update.streak.current_streak, 1);
        assert_eq!(update.streak.total_days, 1);

        let update = record_activity(&pool, id, date("2026-08-02")).await.unwrap();
        assert_eq!(update.streak.current_streak, 2);
        assert_eq!(update.streak.total_days, 2);
    }

    #[tokio::test]
    async fn test_milestone_awards_points_once() {
        let pool = test_pool().await;
        let id = seed_member(&pool).await;

        // Seven consecutive days.
        for day in 1..=7 {
            record_activity(&pool, id, date(&format!("2026-08-{day:02}")))
                .await
                .unwrap();
        }
        let streak = streak_repo::find_by_member(&pool, id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 7);

        let milestones = milestone::list_for_member(&pool, id, false).await.unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].kind, MilestoneKind::StreakMilestone);
        assert_eq!(ledger::balance(&pool, id).await.unwrap().total, 7);

        // Break the streak, then climb back over 7: no second milestone.
        record_activity(&pool, id, date("2026-08-20")).await.unwrap();
        for day in 21..=27 {
            record_activity(&pool, id, date(&format!("2026-08-{day:02}")))
                .await
                .unwrap();
        }
        let milestones = milestone::list_for_member(&pool, id, false).await.unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(ledger::balance(&pool, id).await.unwrap().total, 7);
    }
}
