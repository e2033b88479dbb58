//! Points transaction repository
//!
//! Rows are append-only: inserted once, never updated or deleted.

use shared::models::{PointsTransaction, TransactionKind};
use shared::util::snowflake_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::{RepoError, RepoResult};

const TRANSACTION_SELECT: &str = "SELECT id, member_id, amount, kind, reference_type, reference_id, description, created_at, expires_at FROM points_transaction";

pub struct NewTransaction<'a> {
    pub member_id: i64,
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference_type: &'a str,
    pub reference_id: &'a str,
    pub description: &'a str,
    pub expires_at: Option<i64>,
}

/// Insert respecting the idempotency key `(member_id, reference_type,
/// reference_id, kind)`. Returns `None` when a row with the same key already
/// exists — the caller resolves that to the existing row, not an error.
pub async fn insert(
    conn: &mut SqliteConnection,
    tx: &NewTransaction<'_>,
    now: i64,
) -> RepoResult<Option<PointsTransaction>> {
    let id = snowflake_id();
    let rows = sqlx::query(
        "INSERT INTO points_transaction (id, member_id, amount, kind, reference_type, reference_id, description, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (member_id, reference_type, reference_id, kind) DO NOTHING",
    )
    .bind(id)
    .bind(tx.member_id)
    .bind(tx.amount)
    .bind(tx.kind)
    .bind(tx.reference_type)
    .bind(tx.reference_id)
    .bind(tx.description)
    .bind(now)
    .bind(tx.expires_at)
    .execute(&mut *conn)
    .await?;

    if rows.rows_affected() == 0 {
        return Ok(None);
    }
    let sql = format!("{TRANSACTION_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, PointsTransaction>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("transaction {id}")))?;
    Ok(Some(row))
}

pub async fn find_by_reference(
    conn: &mut SqliteConnection,
    member_id: i64,
    reference_type: &str,
    reference_id: &str,
    kind: TransactionKind,
) -> RepoResult<Option<PointsTransaction>> {
    let sql = format!(
        "{TRANSACTION_SELECT} WHERE member_id = ?1 AND reference_type = ?2 AND reference_id = ?3 AND kind = ?4",
    );
    let row = sqlx::query_as::<_, PointsTransaction>(&sql)
        .bind(member_id)
        .bind(reference_type)
        .bind(reference_id)
        .bind(kind)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Full ledger for one member, oldest first (the order balance computation
/// consumes it in).
pub async fn all_for_member(
    conn: &mut SqliteConnection,
    member_id: i64,
) -> RepoResult<Vec<PointsTransaction>> {
    let sql = format!("{TRANSACTION_SELECT} WHERE member_id = ? ORDER BY created_at ASC, id ASC");
    let rows = sqlx::query_as::<_, PointsTransaction>(&sql)
        .bind(member_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

/// Paginated history, newest first, optionally filtered by kind.
pub async fn history(
    pool: &SqlitePool,
    member_id: i64,
    limit: i64,
    offset: i64,
    kind: Option<TransactionKind>,
) -> RepoResult<Vec<PointsTransaction>> {
    let rows = match kind {
        Some(kind) => {
            let sql = format!(
                "{TRANSACTION_SELECT} WHERE member_id = ?1 AND kind = ?2 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            );
            sqlx::query_as::<_, PointsTransaction>(&sql)
                .bind(member_id)
                .bind(kind)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "{TRANSACTION_SELECT} WHERE member_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            );
            sqlx::query_as::<_, PointsTransaction>(&sql)
                .bind(member_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

/// Number of transactions of one kind (e.g. completed tasks).
pub async fn count_by_kind(
    conn: &mut SqliteConnection,
    member_id: i64,
    kind: TransactionKind,
) -> RepoResult<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM points_transaction WHERE member_id = ?1 AND kind = ?2",
    )
    .bind(member_id)
    .bind(kind)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}
