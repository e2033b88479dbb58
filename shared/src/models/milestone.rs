//! Milestone model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum MilestoneKind {
    RoleAdvance,
    StreakMilestone,
    TaskComplete,
    AchievementEarned,
}

/// A one-time notable event surfaced to the member for celebration.
///
/// `is_celebrated` flips false → true exactly once, when the member
/// acknowledges it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Milestone {
    pub id: i64,
    pub member_id: i64,
    pub kind: MilestoneKind,
    pub title: String,
    pub message: String,
    pub is_celebrated: bool,
    pub created_at: i64,
}
