//! Streak repository (one row per member)

use shared::models::Streak;
use sqlx::{SqliteConnection, SqlitePool};

use super::RepoResult;

const STREAK_SELECT: &str = "SELECT member_id, current_streak, longest_streak, total_days, last_activity_date FROM streak";

pub async fn find_by_member(pool: &SqlitePool, member_id: i64) -> RepoResult<Option<Streak>> {
    let sql = format!("{STREAK_SELECT} WHERE member_id = ?");
    let row = sqlx::query_as::<_, Streak>(&sql)
        .bind(member_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_tx(conn: &mut SqliteConnection, member_id: i64) -> RepoResult<Option<Streak>> {
    let sql = format!("{STREAK_SELECT} WHERE member_id = ?");
    let row = sqlx::query_as::<_, Streak>(&sql)
        .bind(member_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn upsert(conn: &mut SqliteConnection, streak: &Streak) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO streak (member_id, current_streak, longest_streak, total_days, last_activity_date)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (member_id) DO UPDATE SET
            current_streak = ?2, longest_streak = ?3, total_days = ?4, last_activity_date = ?5",
    )
    .bind(streak.member_id)
    .bind(streak.current_streak)
    .bind(streak.longest_streak)
    .bind(streak.total_days)
    .bind(streak.last_activity_date)
    .execute(conn)
    .await?;
    Ok(())
}
