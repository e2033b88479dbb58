//! Membership roles, requirements and advancement requests

use serde::{Deserialize, Serialize};

/// Ordered membership role.
///
/// Declaration order IS the progression order; `level()` is the single
/// numeric ordering function. Stored as snake_case TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum MembershipRole {
    Supporter,
    Member,
    Organizer,
    Leader,
}

impl MembershipRole {
    /// All roles, lowest level first.
    pub const ALL: [MembershipRole; 4] = [
        MembershipRole::Supporter,
        MembershipRole::Member,
        MembershipRole::Organizer,
        MembershipRole::Leader,
    ];

    /// Numeric level (strict total order, starts at 1).
    pub fn level(self) -> i64 {
        match self {
            MembershipRole::Supporter => 1,
            MembershipRole::Member => 2,
            MembershipRole::Organizer => 3,
            MembershipRole::Leader => 4,
        }
    }

    /// The next role up, or `None` at the terminal role.
    pub fn next(self) -> Option<MembershipRole> {
        match self {
            MembershipRole::Supporter => Some(MembershipRole::Member),
            MembershipRole::Member => Some(MembershipRole::Organizer),
            MembershipRole::Organizer => Some(MembershipRole::Leader),
            MembershipRole::Leader => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MembershipRole::Supporter => "supporter",
            MembershipRole::Member => "member",
            MembershipRole::Organizer => "organizer",
            MembershipRole::Leader => "leader",
        }
    }
}

impl std::fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organization policy for how an eligible member advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum AdvancementMode {
    Automatic,
    ApprovalRequired,
}

impl AdvancementMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AdvancementMode::Automatic => "automatic",
            AdvancementMode::ApprovalRequired => "approval_required",
        }
    }
}

impl std::str::FromStr for AdvancementMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(AdvancementMode::Automatic),
            "approval_required" => Ok(AdvancementMode::ApprovalRequired),
            other => Err(ParseEnumError {
                kind: "advancement mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Failed to parse a stored enum value.
#[derive(Debug, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Eligibility thresholds for one role.
///
/// A threshold of 0 is automatically satisfied. `advancement_mode` overrides
/// the organization-wide mode for this role when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct RoleRequirement {
    pub role: MembershipRole,
    pub level: i64,
    pub points_required: i64,
    pub referrals_required: i64,
    pub tasks_required: i64,
    pub tenure_days_required: i64,
    pub advancement_mode: Option<AdvancementMode>,
}

/// Lifecycle of an advancement request: pending → approved | rejected,
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(rename_all = "snake_case")
)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// A queued role advancement awaiting admin review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct AdvancementRequest {
    pub id: i64,
    pub member_id: i64,
    pub from_role: MembershipRole,
    pub to_role: MembershipRole,
    pub status: RequestStatus,
    pub requested_at: i64,
    pub reviewed_by_id: Option<i64>,
    pub reviewed_at: Option<i64>,
    pub rejection_reason: Option<String>,
}

/// Pending request with member info (for the admin queue view).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PendingRequestView {
    pub id: i64,
    pub member_id: i64,
    pub member_display_name: String,
    pub from_role: MembershipRole,
    pub to_role: MembershipRole,
    pub requested_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_levels_strictly_increase() {
        let levels: Vec<i64> = MembershipRole::ALL.iter().map(|r| r.level()).collect();
        for pair in levels.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_role_next_chain_terminates_at_leader() {
        let mut role = MembershipRole::Supporter;
        let mut hops = 0;
        while let Some(next) = role.next() {
            assert_eq!(next.level(), role.level() + 1);
            role = next;
            hops += 1;
        }
        assert_eq!(role, MembershipRole::Leader);
        assert_eq!(hops, MembershipRole::ALL.len() - 1);
    }

    #[test]
    fn test_role_ord_matches_level() {
        assert!(MembershipRole::Supporter < MembershipRole::Member);
        assert!(MembershipRole::Member < MembershipRole::Organizer);
        assert!(MembershipRole::Organizer < MembershipRole::Leader);
    }

    #[test]
    fn test_advancement_mode_round_trip() {
        for mode in [AdvancementMode::Automatic, AdvancementMode::ApprovalRequired] {
            assert_eq!(mode.as_str().parse::<AdvancementMode>().unwrap(), mode);
        }
        assert!("sometimes".parse::<AdvancementMode>().is_err());
    }
}
