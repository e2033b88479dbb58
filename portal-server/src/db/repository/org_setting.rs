//! Organization settings (key/value)
//!
//! Policy values are read per evaluation so an admin change is never applied
//! stale mid-flight.

use shared::models::AdvancementMode;
use sqlx::SqlitePool;

use super::RepoResult;

pub const ADVANCEMENT_MODE: &str = "advancement_mode";
pub const REFERRAL_AWARD_POINTS: &str = "referral_award_points";

const DEFAULT_REFERRAL_AWARD: i64 = 25;

pub async fn get(pool: &SqlitePool, key: &str) -> RepoResult<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM org_setting WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> RepoResult<()> {
    sqlx::query(
        "INSERT INTO org_setting (key, value) VALUES (?1, ?2)
         ON CONFLICT (key) DO UPDATE SET value = ?2",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Organization-wide advancement mode. Missing row falls back to the seeded
/// default; an unrecognized value defers to admin review.
pub async fn advancement_mode(pool: &SqlitePool) -> RepoResult<AdvancementMode> {
    let Some(value) = get(pool, ADVANCEMENT_MODE).await? else {
        return Ok(AdvancementMode::Automatic);
    };
    match value.parse() {
        Ok(mode) => Ok(mode),
        Err(_) => {
            tracing::warn!(%value, "unrecognized advancement_mode setting, requiring approval");
            Ok(AdvancementMode::ApprovalRequired)
        }
    }
}

/// Points credited to a referrer when a referred member becomes active.
pub async fn referral_award_points(pool: &SqlitePool) -> RepoResult<i64> {
    let value = get(pool, REFERRAL_AWARD_POINTS).await?;
    Ok(value
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_REFERRAL_AWARD))
}
