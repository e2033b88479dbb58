//! Referral attribution
//!
//! When a referred member becomes active, the referrer is credited once.
//! The ledger's idempotency key is the referred member's id, so a
//! reactivation can never double-credit.

use shared::models::TransactionKind;
use shared::util::now_millis;
use sqlx::SqlitePool;

use crate::db::repository::{RepoError, member as member_repo, org_setting};
use crate::progression::ledger::{self, AwardPoints, LedgerReceipt};
use crate::progression::{ProgressionError, ProgressionResult, member_not_found, with_retry};

/// reference_type of referral credit transactions; reference_id is the
/// referred member's id.
const REFERRAL_REFERENCE: &str = "referral";

/// Credit the referrer (if any) of a newly activated member and refresh the
/// referrer's referral_count cache. Returns `None` when the member has no
/// referrer. Idempotent end to end.
pub async fn on_member_activated(
    pool: &SqlitePool,
    member_id: i64,
) -> ProgressionResult<Option<LedgerReceipt>> {
    let award_amount = org_setting::referral_award_points(pool).await?;
    with_retry(|| async move {
        let mut tx = pool.begin().await.map_err(RepoError::from)?;
        member_repo::touch_for_update(&mut tx, member_id)
            .await
            .map_err(member_not_found(member_id))?;
        let member = member_repo::get_tx(&mut tx, member_id).await?;

        let Some(referrer_id) = member.referred_by_id else {
            return Ok(None);
        };

        let credit = ledger::award_tx(
            &mut tx,
            &AwardPoints {
                member_id: referrer_id,
                amount: award_amount,
                kind: TransactionKind::EarnReferral,
                reference_type: REFERRAL_REFERENCE.into(),
                reference_id: member.id.to_string(),
                description: format!("Referral: {} became an active member", member.display_name),
                expires_at: None,
            },
        )
        .await;
        let receipt = match credit {
            // referred_by_id is a weak reference; a vanished referrer is not
            // the activated member's problem.
            Err(ProgressionError::MemberNotFound(_)) => {
                tracing::warn!(member_id, referrer_id, "referrer no longer exists");
                return Ok(None);
            }
            other => other?,
        };

        let now = now_millis();
        let count = member_repo::refresh_referral_count(&mut tx, referrer_id, now).await?;
        tx.commit().await.map_err(RepoError::from)?;
        if !receipt.duplicate {
            tracing::info!(referrer_id, member_id, referral_count = count, "referral credited");
        }
        Ok(Some(receipt))
    })
    .await
}
