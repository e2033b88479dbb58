//! Role advancement state machine
//!
//! On a triggering event the controller recomputes live stats, evaluates the
//! next role's requirements, and either mutates the role directly
//! (automatic mode) or queues a pending request for admin review
//! (approval mode). Only ever one level per invocation, so an intermediate
//! role's approval gate can never be skipped by a bulk point grant.

use serde::Serialize;
use serde_json::json;
use shared::models::{
    AdvancementMode, AdvancementRequest, Member, MembershipRole, Milestone, MilestoneKind,
    PendingRequestView, RequestStatus,
};
use shared::util::now_millis;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::repository::{
    RepoError, advancement as request_repo, audit, member as member_repo, milestone as milestone_repo,
};
use crate::progression::catalog::RoleCatalog;
use crate::progression::eligibility::{self, Evaluation, MemberStats, RequirementProgress};
use crate::progression::{ProgressionError, ProgressionResult, member_not_found, with_retry};

/// Outcome of a `check_and_advance` invocation. `ApprovalRequired` is a
/// distinguished branch, not a failure — callers must handle it explicitly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Advanced { new_role: MembershipRole },
    ApprovalRequired { request_id: i64 },
    NotEligible {
        next_role: MembershipRole,
        progress: RequirementProgress,
    },
    AtTerminalRole,
}

/// Evaluate the member against the next role and advance (or queue) when
/// eligible. One atomic transaction, serialized on the member row; stats are
/// recomputed from source tables, never trusted from the cached counters.
///
/// `org_mode` is the organization-wide policy, read by the caller per
/// evaluation so a mid-flight admin change is never applied stale.
pub async fn check_and_advance(
    pool: &SqlitePool,
    catalog: &RoleCatalog,
    org_mode: AdvancementMode,
    member_id: i64,
) -> ProgressionResult<AdvanceOutcome> {
    with_retry(|| async move {
        let mut tx = pool.begin().await.map_err(RepoError::from)?;
        member_repo::touch_for_update(&mut tx, member_id)
            .await
            .map_err(member_not_found(member_id))?;
        let member = member_repo::get_tx(&mut tx, member_id).await?;

        let Some(next_role) = catalog.next_role(member.membership_role) else {
            return Ok(AdvanceOutcome::AtTerminalRole);
        };
        let Some(requirement) = catalog.requirements_for(next_role) else {
            return Ok(AdvanceOutcome::AtTerminalRole);
        };

        let now = now_millis();
        let stats = eligibility::recompute_stats(&mut tx, &member, now).await?;
        let evaluation = eligibility::evaluate(&stats, requirement);
        if !evaluation.is_eligible {
            return Ok(AdvanceOutcome::NotEligible {
                next_role,
                progress: evaluation.progress,
            });
        }

        // An outstanding request always defers to admin review, even when
        // the mode has since flipped to automatic.
        if let Some(pending) = request_repo::find_pending_for_member(&mut tx, member_id).await? {
            return Ok(AdvanceOutcome::ApprovalRequired {
                request_id: pending.id,
            });
        }

        match catalog.effective_mode(next_role, org_mode) {
            AdvancementMode::Automatic => {
                advance_role(&mut tx, &member, next_role, now).await?;
                tx.commit().await.map_err(RepoError::from)?;
                tracing::info!(
                    member_id,
                    from = %member.membership_role,
                    to = %next_role,
                    "role advanced"
                );
                Ok(AdvanceOutcome::Advanced {
                    new_role: next_role,
                })
            }
            AdvancementMode::ApprovalRequired => {
                let request = match request_repo::insert_pending(
                    &mut tx,
                    member_id,
                    member.membership_role,
                    next_role,
                    now,
                )
                .await?
                {
                    Some(r) => r,
                    // Lost a race on the partial unique index.
                    None => request_repo::find_pending_for_member(&mut tx, member_id)
                        .await?
                        .ok_or_else(|| {
                            RepoError::NotFound(format!("pending request for member {member_id}"))
                        })?,
                };
                tx.commit().await.map_err(RepoError::from)?;
                tracing::info!(member_id, to = %next_role, "advancement queued for approval");
                Ok(AdvanceOutcome::ApprovalRequired {
                    request_id: request.id,
                })
            }
        }
    })
    .await
}

/// Read-only view of where a member stands, for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressionSnapshot {
    pub current_role: MembershipRole,
    pub next_role: Option<MembershipRole>,
    pub stats: MemberStats,
    pub evaluation: Option<Evaluation>,
    pub pending_request: Option<AdvancementRequest>,
}

pub async fn progression_snapshot(
    pool: &SqlitePool,
    catalog: &RoleCatalog,
    member_id: i64,
) -> ProgressionResult<ProgressionSnapshot> {
    let member = member_repo::find_by_id(pool, member_id)
        .await?
        .ok_or(ProgressionError::MemberNotFound(member_id))?;
    let mut conn = pool.acquire().await.map_err(RepoError::from)?;
    let stats = eligibility::recompute_stats(&mut conn, &member, now_millis()).await?;
    let next_role = catalog.next_role(member.membership_role);
    let evaluation = next_role
        .and_then(|r| catalog.requirements_for(r))
        .map(|req| eligibility::evaluate(&stats, req));
    let pending_request = request_repo::find_pending_for_member(&mut conn, member_id).await?;
    Ok(ProgressionSnapshot {
        current_role: member.membership_role,
        next_role,
        stats,
        evaluation,
        pending_request,
    })
}

#[derive(Debug, Clone)]
pub struct ManualAdvance {
    pub member_id: i64,
    pub to_role: MembershipRole,
    pub admin_id: i64,
    pub reason: Option<String>,
    /// Explicit opt-in for lowering a member's role.
    pub allow_demotion: bool,
}

/// Admin override: set the role without any eligibility check. Upward-only
/// unless demotion is explicitly allowed.
pub async fn manually_advance(pool: &SqlitePool, cmd: &ManualAdvance) -> ProgressionResult<Member> {
    with_retry(|| async move {
        let mut tx = pool.begin().await.map_err(RepoError::from)?;
        member_repo::touch_for_update(&mut tx, cmd.member_id)
            .await
            .map_err(member_not_found(cmd.member_id))?;
        let member = member_repo::get_tx(&mut tx, cmd.member_id).await?;

        let upward = cmd.to_role.level() > member.membership_role.level();
        if cmd.to_role == member.membership_role || (!upward && !cmd.allow_demotion) {
            return Err(ProgressionError::InvalidRoleTransition {
                from: member.membership_role,
                to: cmd.to_role,
            });
        }

        let now = now_millis();
        member_repo::set_role(&mut tx, cmd.member_id, cmd.to_role, now).await?;
        if upward {
            emit_role_milestone(&mut tx, &member, cmd.to_role, true, now).await?;
        }
        audit::log(
            &mut tx,
            &audit::NewAuditEntry {
                actor_id: cmd.admin_id,
                action: "member.role.manual_change",
                subject_type: "member",
                subject_id: cmd.member_id.to_string(),
                detail: Some(json!({
                    "from": member.membership_role,
                    "to": cmd.to_role,
                    "reason": &cmd.reason,
                })),
            },
            now,
        )
        .await?;

        let updated = member_repo::get_tx(&mut tx, cmd.member_id).await?;
        tx.commit().await.map_err(RepoError::from)?;
        tracing::info!(
            member_id = cmd.member_id,
            admin_id = cmd.admin_id,
            from = %member.membership_role,
            to = %cmd.to_role,
            "role changed manually"
        );
        Ok(updated)
    })
    .await
}

#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub request_id: i64,
    pub admin_id: i64,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

/// One-shot review of a pending request. Approval performs the same role
/// mutation as automatic advancement, atomically with the status flip; the
/// member's level never decreases through a stale approval.
pub async fn process_request(
    pool: &SqlitePool,
    cmd: &ReviewRequest,
) -> ProgressionResult<AdvancementRequest> {
    with_retry(|| async move {
        let mut tx = pool.begin().await.map_err(RepoError::from)?;
        let request = request_repo::get(&mut tx, cmd.request_id)
            .await?
            .ok_or(ProgressionError::RequestNotFound(cmd.request_id))?;
        if request.status != RequestStatus::Pending {
            return Err(ProgressionError::RequestAlreadyProcessed(cmd.request_id));
        }
        member_repo::touch_for_update(&mut tx, request.member_id)
            .await
            .map_err(member_not_found(request.member_id))?;

        let now = now_millis();
        let status = if cmd.approved {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        let claimed = request_repo::mark_processed(
            &mut tx,
            cmd.request_id,
            status,
            cmd.admin_id,
            cmd.rejection_reason.as_deref(),
            now,
        )
        .await?;
        if !claimed {
            return Err(ProgressionError::RequestAlreadyProcessed(cmd.request_id));
        }

        if cmd.approved {
            let member = member_repo::get_tx(&mut tx, request.member_id).await?;
            if request.to_role.level() > member.membership_role.level() {
                advance_role(&mut tx, &member, request.to_role, now).await?;
            }
        }
        audit::log(
            &mut tx,
            &audit::NewAuditEntry {
                actor_id: cmd.admin_id,
                action: "advancement_request.review",
                subject_type: "advancement_request",
                subject_id: cmd.request_id.to_string(),
                detail: Some(json!({
                    "approved": cmd.approved,
                    "rejection_reason": &cmd.rejection_reason,
                })),
            },
            now,
        )
        .await?;

        let processed = request_repo::get(&mut tx, cmd.request_id)
            .await?
            .ok_or(ProgressionError::RequestNotFound(cmd.request_id))?;
        tx.commit().await.map_err(RepoError::from)?;
        tracing::info!(
            request_id = cmd.request_id,
            admin_id = cmd.admin_id,
            approved = cmd.approved,
            "advancement request reviewed"
        );
        Ok(processed)
    })
    .await
}

/// Pending queue for the admin back-office.
pub async fn pending_requests(pool: &SqlitePool) -> ProgressionResult<Vec<PendingRequestView>> {
    Ok(request_repo::list_pending(pool).await?)
}

/// Latest role-advance milestones across all members.
pub async fn recent_advancements(pool: &SqlitePool, limit: i64) -> ProgressionResult<Vec<Milestone>> {
    Ok(milestone_repo::recent_role_advances(pool, limit.clamp(1, 100)).await?)
}

async fn advance_role(
    conn: &mut SqliteConnection,
    member: &Member,
    to_role: MembershipRole,
    now: i64,
) -> ProgressionResult<()> {
    member_repo::set_role(conn, member.id, to_role, now).await?;
    emit_role_milestone(conn, member, to_role, false, now).await?;
    Ok(())
}

async fn emit_role_milestone(
    conn: &mut SqliteConnection,
    member: &Member,
    to_role: MembershipRole,
    manual: bool,
    now: i64,
) -> ProgressionResult<()> {
    let message = if manual {
        format!(
            "{} was promoted to the {} role by an administrator",
            member.display_name, to_role
        )
    } else {
        format!("{} reached the {} role", member.display_name, to_role)
    };
    milestone_repo::insert(
        conn,
        member.id,
        MilestoneKind::RoleAdvance,
        &format!("Advanced to {to_role}"),
        &message,
        now,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{member, milestone};
    use crate::db::test_pool;
    use crate::progression::ledger::{self, AwardPoints};
    use shared::models::{MemberCreate, TransactionKind};

    async fn seed_member(pool: &SqlitePool, name: &str) -> i64 {
        member::create(
            pool,
            &MemberCreate {
                display_name: name.into(),
                email: None,
                referred_by_id: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn grant(pool: &SqlitePool, member_id: i64, amount: i64, reference: &str) {
        ledger::award(
            pool,
            &AwardPoints {
                member_id,
                amount,
                kind: TransactionKind::EarnTask,
                reference_type: "task".into(),
                reference_id: reference.into(),
                description: String::new(),
                expires_at: None,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_not_eligible_reports_progress() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 100, "t-1").await;

        let outcome = check_and_advance(&pool, &catalog, AdvancementMode::Automatic, id)
            .await
            .unwrap();
        match outcome {
            AdvanceOutcome::NotEligible { next_role, progress } => {
                assert_eq!(next_role, MembershipRole::Member);
                assert_eq!(progress.points.current, 100);
                assert_eq!(progress.points.required, 150);
            }
            other => panic!("expected NotEligible, got {other:?}"),
        }
        // Role untouched.
        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Supporter);
    }

    #[tokio::test]
    async fn test_automatic_advance_mutates_role_and_emits_milestone() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 100, "t-1").await;
        grant(&pool, id, 50, "t-2").await;

        let outcome = check_and_advance(&pool, &catalog, AdvancementMode::Automatic, id)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AdvanceOutcome::Advanced {
                new_role: MembershipRole::Member
            }
        ));

        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Member);
        assert!(m.role_advanced_at.is_some());

        let milestones = milestone::list_for_member(&pool, id, false).await.unwrap();
        assert_eq!(milestones.len(), 1);
        assert_eq!(milestones[0].kind, shared::models::MilestoneKind::RoleAdvance);
    }

    #[tokio::test]
    async fn test_one_level_per_invocation() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        // Enough points for organizer in one grant, but referrals/tasks are
        // missing anyway — the first call advances exactly one level.
        grant(&pool, id, 1000, "t-1").await;

        let first = check_and_advance(&pool, &catalog, AdvancementMode::Automatic, id)
            .await
            .unwrap();
        assert!(matches!(
            first,
            AdvanceOutcome::Advanced {
                new_role: MembershipRole::Member
            }
        ));

        // Second call re-evaluates from the new role (organizer needs more
        // than points).
        let second = check_and_advance(&pool, &catalog, AdvancementMode::Automatic, id)
            .await
            .unwrap();
        assert!(matches!(second, AdvanceOutcome::NotEligible { .. }));
    }

    #[tokio::test]
    async fn test_approval_mode_queues_single_pending_request() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 150, "t-1").await;

        let first = check_and_advance(&pool, &catalog, AdvancementMode::ApprovalRequired, id)
            .await
            .unwrap();
        let AdvanceOutcome::ApprovalRequired { request_id } = first else {
            panic!("expected ApprovalRequired, got {first:?}");
        };
        // Role not mutated under approval mode.
        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Supporter);

        // A second check creates no additional pending request.
        let second = check_and_advance(&pool, &catalog, AdvancementMode::ApprovalRequired, id)
            .await
            .unwrap();
        assert!(matches!(
            second,
            AdvanceOutcome::ApprovalRequired { request_id: r } if r == request_id
        ));
        assert_eq!(pending_requests(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_request_blocks_automatic_advance() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 150, "t-1").await;

        let queued = check_and_advance(&pool, &catalog, AdvancementMode::ApprovalRequired, id)
            .await
            .unwrap();
        let AdvanceOutcome::ApprovalRequired { request_id } = queued else {
            panic!("expected ApprovalRequired");
        };

        // Mode flipped back to automatic while the request is outstanding:
        // the queued decision still belongs to the admin.
        let outcome = check_and_advance(&pool, &catalog, AdvancementMode::Automatic, id)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            AdvanceOutcome::ApprovalRequired { request_id: r } if r == request_id
        ));
        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Supporter);
    }

    #[tokio::test]
    async fn test_approval_advances_role_and_is_one_shot() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 150, "t-1").await;

        let AdvanceOutcome::ApprovalRequired { request_id } =
            check_and_advance(&pool, &catalog, AdvancementMode::ApprovalRequired, id)
                .await
                .unwrap()
        else {
            panic!("expected ApprovalRequired");
        };

        let review = ReviewRequest {
            request_id,
            admin_id: 1,
            approved: true,
            rejection_reason: None,
        };
        let processed = process_request(&pool, &review).await.unwrap();
        assert_eq!(processed.status, RequestStatus::Approved);
        assert_eq!(processed.reviewed_by_id, Some(1));

        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Member);

        // Reprocessing is a terminal error, not a retry.
        let err = process_request(&pool, &review).await.unwrap_err();
        assert!(matches!(
            err,
            ProgressionError::RequestAlreadyProcessed(r) if r == request_id
        ));
    }

    #[tokio::test]
    async fn test_rejection_records_reason_and_leaves_role() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 150, "t-1").await;

        let AdvanceOutcome::ApprovalRequired { request_id } =
            check_and_advance(&pool, &catalog, AdvancementMode::ApprovalRequired, id)
                .await
                .unwrap()
        else {
            panic!("expected ApprovalRequired");
        };

        let processed = process_request(
            &pool,
            &ReviewRequest {
                request_id,
                admin_id: 7,
                approved: false,
                rejection_reason: Some("needs more tenure".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(processed.status, RequestStatus::Rejected);
        assert_eq!(processed.rejection_reason.as_deref(), Some("needs more tenure"));

        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Supporter);

        // A rejected member can queue again later.
        let again = check_and_advance(&pool, &catalog, AdvancementMode::ApprovalRequired, id)
            .await
            .unwrap();
        assert!(matches!(again, AdvanceOutcome::ApprovalRequired { request_id: r } if r != request_id));
    }

    #[tokio::test]
    async fn test_process_unknown_request() {
        let pool = test_pool().await;
        let err = process_request(
            &pool,
            &ReviewRequest {
                request_id: 424242,
                admin_id: 1,
                approved: true,
                rejection_reason: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProgressionError::RequestNotFound(424242)));
    }

    #[tokio::test]
    async fn test_terminal_role_has_nowhere_to_go() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        manually_advance(
            &pool,
            &ManualAdvance {
                member_id: id,
                to_role: MembershipRole::Leader,
                admin_id: 1,
                reason: None,
                allow_demotion: false,
            },
        )
        .await
        .unwrap();

        let outcome = check_and_advance(&pool, &catalog, AdvancementMode::Automatic, id)
            .await
            .unwrap();
        assert!(matches!(outcome, AdvanceOutcome::AtTerminalRole));
    }

    #[tokio::test]
    async fn test_manual_advance_skips_eligibility_but_not_order() {
        let pool = test_pool().await;
        let id = seed_member(&pool, "Alice").await;

        // No points at all — manual override does not care.
        let updated = manually_advance(
            &pool,
            &ManualAdvance {
                member_id: id,
                to_role: MembershipRole::Organizer,
                admin_id: 9,
                reason: Some("board appointment".into()),
                allow_demotion: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.membership_role, MembershipRole::Organizer);

        // Downward without the demote flag is rejected.
        let err = manually_advance(
            &pool,
            &ManualAdvance {
                member_id: id,
                to_role: MembershipRole::Supporter,
                admin_id: 9,
                reason: None,
                allow_demotion: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProgressionError::InvalidRoleTransition { .. }));

        // With the flag it goes through, and emits no advance milestone.
        let updated = manually_advance(
            &pool,
            &ManualAdvance {
                member_id: id,
                to_role: MembershipRole::Supporter,
                admin_id: 9,
                reason: Some("disciplinary".into()),
                allow_demotion: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.membership_role, MembershipRole::Supporter);
        let milestones = milestone::list_for_member(&pool, id, false).await.unwrap();
        assert_eq!(milestones.len(), 1); // only the upward move
    }

    #[tokio::test]
    async fn test_stale_approval_never_demotes() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 150, "t-1").await;

        let AdvanceOutcome::ApprovalRequired { request_id } =
            check_and_advance(&pool, &catalog, AdvancementMode::ApprovalRequired, id)
                .await
                .unwrap()
        else {
            panic!("expected ApprovalRequired");
        };

        // Admin manually jumps the member past the requested role first.
        manually_advance(
            &pool,
            &ManualAdvance {
                member_id: id,
                to_role: MembershipRole::Organizer,
                admin_id: 1,
                reason: None,
                allow_demotion: false,
            },
        )
        .await
        .unwrap();

        // Approving the stale request flips its status but leaves the role.
        let processed = process_request(
            &pool,
            &ReviewRequest {
                request_id,
                admin_id: 2,
                approved: true,
                rejection_reason: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(processed.status, RequestStatus::Approved);
        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Organizer);
    }

    #[tokio::test]
    async fn test_progression_snapshot_reports_without_advancing() {
        let pool = test_pool().await;
        let catalog = RoleCatalog::builtin();
        let id = seed_member(&pool, "Alice").await;
        grant(&pool, id, 150, "t-1").await;

        let snapshot = progression_snapshot(&pool, &catalog, id).await.unwrap();
        assert_eq!(snapshot.current_role, MembershipRole::Supporter);
        assert_eq!(snapshot.next_role, Some(MembershipRole::Member));
        assert!(snapshot.evaluation.unwrap().is_eligible);
        assert!(snapshot.pending_request.is_none());

        // Snapshot is read-only.
        let m = member::find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(m.membership_role, MembershipRole::Supporter);
    }
}
