//! Member model

use serde::{Deserialize, Serialize};

use crate::models::progression::MembershipRole;

/// Member entity.
///
/// `points_balance` and `referral_count` are derived caches maintained by the
/// progression engine — display values only, never inputs to an eligibility
/// decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Member {
    pub id: i64,
    pub display_name: String,
    pub email: Option<String>,
    pub membership_role: MembershipRole,
    pub points_balance: i64,
    pub referral_count: i64,
    pub referred_by_id: Option<i64>,
    pub is_active: bool,
    pub role_advanced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create member payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberCreate {
    pub display_name: String,
    pub email: Option<String>,
    pub referred_by_id: Option<i64>,
}
