//! Milestone repository

use shared::models::{Milestone, MilestoneKind};
use shared::util::snowflake_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::{RepoError, RepoResult};

const MILESTONE_SELECT: &str = "SELECT id, member_id, kind, title, message, is_celebrated, created_at FROM milestone";

pub async fn insert(
    conn: &mut SqliteConnection,
    member_id: i64,
    kind: MilestoneKind,
    title: &str,
    message: &str,
    now: i64,
) -> RepoResult<Milestone> {
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO milestone (id, member_id, kind, title, message, is_celebrated, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
    )
    .bind(id)
    .bind(member_id)
    .bind(kind)
    .bind(title)
    .bind(message)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let sql = format!("{MILESTONE_SELECT} WHERE id = ?");
    sqlx::query_as::<_, Milestone>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("milestone {id}")))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Milestone>> {
    let sql = format!("{MILESTONE_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Milestone>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_for_member(
    pool: &SqlitePool,
    member_id: i64,
    only_uncelebrated: bool,
) -> RepoResult<Vec<Milestone>> {
    let sql = if only_uncelebrated {
        format!("{MILESTONE_SELECT} WHERE member_id = ? AND is_celebrated = 0 ORDER BY created_at DESC")
    } else {
        format!("{MILESTONE_SELECT} WHERE member_id = ? ORDER BY created_at DESC")
    };
    let rows = sqlx::query_as::<_, Milestone>(&sql)
        .bind(member_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// One-shot acknowledge: flips is_celebrated false → true. Returns `false`
/// when the milestone was already celebrated.
pub async fn celebrate(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let rows = sqlx::query("UPDATE milestone SET is_celebrated = 1 WHERE id = ? AND is_celebrated = 0")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}

/// Latest role-advance milestones across all members (admin feed).
pub async fn recent_role_advances(pool: &SqlitePool, limit: i64) -> RepoResult<Vec<Milestone>> {
    let sql = format!(
        "{MILESTONE_SELECT} WHERE kind = 'role_advance' ORDER BY created_at DESC, id DESC LIMIT ?"
    );
    let rows = sqlx::query_as::<_, Milestone>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
