//! Member repository

use shared::models::{Member, MemberCreate, MembershipRole};
use shared::util::{now_millis, snowflake_id};
use sqlx::{SqliteConnection, SqlitePool};

use super::{RepoError, RepoResult};

const MEMBER_SELECT: &str = "SELECT id, display_name, email, membership_role, points_balance, referral_count, referred_by_id, is_active, role_advanced_at, created_at, updated_at FROM member";

pub async fn create(pool: &SqlitePool, data: &MemberCreate) -> RepoResult<Member> {
    let now = now_millis();
    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO member (id, display_name, email, membership_role, referred_by_id, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'supporter', ?4, 1, ?5, ?5)",
    )
    .bind(id)
    .bind(&data.display_name)
    .bind(&data.email)
    .bind(data.referred_by_id)
    .bind(now)
    .execute(pool)
    .await?;
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("member {id}")))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Member>> {
    let sql = format!("{MEMBER_SELECT} WHERE id = ?");
    let row = sqlx::query_as::<_, Member>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Fetch inside a transaction (usually after [`touch_for_update`]).
pub async fn get_tx(conn: &mut SqliteConnection, id: i64) -> RepoResult<Member> {
    let sql = format!("{MEMBER_SELECT} WHERE id = ?");
    sqlx::query_as::<_, Member>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("member {id}")))
}

/// Acquire write intent on the member row at the top of a transaction.
///
/// SQLite has no `SELECT … FOR UPDATE`; an UPDATE touch takes the writer
/// lock instead, so concurrent read-decide-write sequences for the same
/// member serialize rather than both observing the pre-decision state.
pub async fn touch_for_update(conn: &mut SqliteConnection, id: i64) -> RepoResult<()> {
    let rows = sqlx::query("UPDATE member SET updated_at = updated_at WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("member {id}")));
    }
    Ok(())
}

/// Bump the denormalized points cache (display value only).
pub async fn adjust_points_cache(
    conn: &mut SqliteConnection,
    id: i64,
    delta: i64,
    now: i64,
) -> RepoResult<()> {
    sqlx::query("UPDATE member SET points_balance = points_balance + ?1, updated_at = ?2 WHERE id = ?3")
        .bind(delta)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_role(
    conn: &mut SqliteConnection,
    id: i64,
    role: MembershipRole,
    now: i64,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE member SET membership_role = ?1, role_advanced_at = ?2, updated_at = ?2 WHERE id = ?3",
    )
    .bind(role)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn mark_active(pool: &SqlitePool, id: i64, now: i64) -> RepoResult<()> {
    let rows = sqlx::query("UPDATE member SET is_active = 1, updated_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("member {id}")));
    }
    Ok(())
}

/// Count of active members this member referred (source-of-truth value).
pub async fn count_referred_active(conn: &mut SqliteConnection, id: i64) -> RepoResult<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM member WHERE referred_by_id = ? AND is_active = 1",
    )
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

/// Recompute the referral_count cache from the member table.
pub async fn refresh_referral_count(
    conn: &mut SqliteConnection,
    id: i64,
    now: i64,
) -> RepoResult<i64> {
    sqlx::query(
        "UPDATE member SET referral_count = (SELECT COUNT(*) FROM member r WHERE r.referred_by_id = member.id AND r.is_active = 1), updated_at = ?1 WHERE id = ?2",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    let row: (i64,) = sqlx::query_as("SELECT referral_count FROM member WHERE id = ?")
        .bind(id)
        .fetch_one(conn)
        .await?;
    Ok(row.0)
}
