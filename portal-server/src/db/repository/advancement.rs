//! Advancement request repository

use shared::models::{AdvancementRequest, MembershipRole, PendingRequestView, RequestStatus};
use shared::util::snowflake_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::RepoResult;

const REQUEST_SELECT: &str = "SELECT id, member_id, from_role, to_role, status, requested_at, reviewed_by_id, reviewed_at, rejection_reason FROM advancement_request";

/// Create a pending request, guarded by the partial unique index (one
/// pending row per member). Returns `None` when a pending request already
/// exists — the caller falls back to the existing row.
pub async fn insert_pending(
    conn: &mut SqliteConnection,
    member_id: i64,
    from_role: MembershipRole,
    to_role: MembershipRole,
    now: i64,
) -> RepoResult<Option<AdvancementRequest>> {
    let id = snowflake_id();
    let rows = sqlx::query(
        "INSERT INTO advancement_request (id, member_id, from_role, to_role, status, requested_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
         ON CONFLICT (member_id) WHERE status = 'pending' DO NOTHING",
    )
    .bind(id)
    .bind(member_id)
    .bind(from_role)
    .bind(to_role)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Ok(None);
    }
    get(conn, id).await
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: i64,
) -> RepoResult<Option<AdvancementRequest>> {
    let sql = format!("{REQUEST_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, AdvancementRequest>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn find_pending_for_member(
    conn: &mut SqliteConnection,
    member_id: i64,
) -> RepoResult<Option<AdvancementRequest>> {
    let sql = format!("{REQUEST_SELECT} WHERE member_id = ? AND status = 'pending'");
    let row = sqlx::query_as::<_, AdvancementRequest>(&sql)
        .bind(member_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Flip a pending request to its terminal status. Returns `false` when the
/// row was not pending anymore — the one-shot guard against double review.
pub async fn mark_processed(
    conn: &mut SqliteConnection,
    id: i64,
    status: RequestStatus,
    reviewed_by_id: i64,
    rejection_reason: Option<&str>,
    now: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE advancement_request SET status = ?1, reviewed_by_id = ?2, reviewed_at = ?3, rejection_reason = ?4
         WHERE id = ?5 AND status = 'pending'",
    )
    .bind(status)
    .bind(reviewed_by_id)
    .bind(now)
    .bind(rejection_reason)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Pending queue for the admin back-office, oldest first.
pub async fn list_pending(pool: &SqlitePool) -> RepoResult<Vec<PendingRequestView>> {
    let rows = sqlx::query_as::<_, PendingRequestView>(
        "SELECT ar.id, ar.member_id, m.display_name AS member_display_name, ar.from_role, ar.to_role, ar.requested_at
         FROM advancement_request ar
         JOIN member m ON m.id = ar.member_id
         WHERE ar.status = 'pending'
         ORDER BY ar.requested_at ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
