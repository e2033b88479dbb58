//! Activity streak model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Consecutive-day activity streak, one row per member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Streak {
    pub member_id: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_days: i64,
    pub last_activity_date: Option<NaiveDate>,
}

impl Streak {
    /// Fresh state for a member with no recorded activity.
    pub fn new(member_id: i64) -> Self {
        Self {
            member_id,
            current_streak: 0,
            longest_streak: 0,
            total_days: 0,
            last_activity_date: None,
        }
    }
}
