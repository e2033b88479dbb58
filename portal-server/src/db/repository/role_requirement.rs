//! Role requirement repository

use shared::models::RoleRequirement;
use sqlx::SqlitePool;

use super::RepoResult;

/// Full catalog, lowest level first. Loaded once at process start.
pub async fn load_all(pool: &SqlitePool) -> RepoResult<Vec<RoleRequirement>> {
    let rows = sqlx::query_as::<_, RoleRequirement>(
        "SELECT role, level, points_required, referrals_required, tasks_required, tenure_days_required, advancement_mode
         FROM role_requirement ORDER BY level ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
