//! Admin audit log

use shared::util::snowflake_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::RepoResult;

pub struct NewAuditEntry<'a> {
    pub actor_id: i64,
    pub action: &'a str,
    pub subject_type: &'a str,
    pub subject_id: String,
    pub detail: Option<serde_json::Value>,
}

/// Write an audit log entry (inside the caller's transaction).
pub async fn log(
    conn: &mut SqliteConnection,
    entry: &NewAuditEntry<'_>,
    now: i64,
) -> RepoResult<()> {
    let detail = entry.detail.as_ref().map(|d| d.to_string());
    sqlx::query(
        "INSERT INTO audit_log (id, actor_id, action, subject_type, subject_id, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(snowflake_id())
    .bind(entry.actor_id)
    .bind(entry.action)
    .bind(entry.subject_type)
    .bind(&entry.subject_id)
    .bind(detail)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub action: String,
    pub subject_type: String,
    pub subject_id: String,
    pub detail: Option<String>,
    pub created_at: i64,
}

/// Paginated audit read, newest first.
pub async fn query(pool: &SqlitePool, limit: i64, offset: i64) -> RepoResult<Vec<AuditEntry>> {
    let rows: Vec<AuditEntry> = sqlx::query_as(
        "SELECT id, actor_id, action, subject_type, subject_id, detail, created_at
         FROM audit_log ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
