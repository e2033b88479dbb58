//! Role catalog
//!
//! Ordered role requirements, loaded once at process start and read-only
//! thereafter. Reloading requires a restart.

use shared::models::{AdvancementMode, MembershipRole, RoleRequirement};
use sqlx::SqlitePool;

use crate::db::repository::{RepoResult, role_requirement};

#[derive(Debug, Clone)]
pub struct RoleCatalog {
    /// Sorted by level, ascending.
    requirements: Vec<RoleRequirement>,
}

impl RoleCatalog {
    /// Load from the role_requirement table.
    pub async fn load(pool: &SqlitePool) -> RepoResult<Self> {
        Ok(Self {
            requirements: role_requirement::load_all(pool).await?,
        })
    }

    /// Catalog with the built-in thresholds (mirrors the seed migration;
    /// used by tests).
    pub fn builtin() -> Self {
        let requirement = |role: MembershipRole,
                           points: i64,
                           referrals: i64,
                           tasks: i64,
                           tenure_days: i64,
                           mode: Option<AdvancementMode>| RoleRequirement {
            role,
            level: role.level(),
            points_required: points,
            referrals_required: referrals,
            tasks_required: tasks,
            tenure_days_required: tenure_days,
            advancement_mode: mode,
        };
        Self {
            requirements: vec![
                requirement(MembershipRole::Supporter, 0, 0, 0, 0, None),
                requirement(MembershipRole::Member, 150, 0, 0, 0, None),
                requirement(MembershipRole::Organizer, 600, 3, 10, 30, None),
                requirement(
                    MembershipRole::Leader,
                    2000,
                    10,
                    40,
                    180,
                    Some(AdvancementMode::ApprovalRequired),
                ),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// The next role up from `current`, if the catalog defines requirements
    /// for it. `None` at the terminal role.
    pub fn next_role(&self, current: MembershipRole) -> Option<MembershipRole> {
        current.next().filter(|r| self.requirements_for(*r).is_some())
    }

    pub fn requirements_for(&self, role: MembershipRole) -> Option<&RoleRequirement> {
        self.requirements.iter().find(|r| r.role == role)
    }

    pub fn level_of(&self, role: MembershipRole) -> i64 {
        role.level()
    }

    /// Effective mode for advancing INTO `role`: the per-role override when
    /// set, else the organization-wide mode supplied by the caller.
    pub fn effective_mode(&self, role: MembershipRole, org_mode: AdvancementMode) -> AdvancementMode {
        self.requirements_for(role)
            .and_then(|r| r.advancement_mode)
            .unwrap_or(org_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_role_walks_the_ladder() {
        let catalog = RoleCatalog::builtin();
        assert_eq!(
            catalog.next_role(MembershipRole::Supporter),
            Some(MembershipRole::Member)
        );
        assert_eq!(
            catalog.next_role(MembershipRole::Organizer),
            Some(MembershipRole::Leader)
        );
        assert_eq!(catalog.next_role(MembershipRole::Leader), None);
    }

    #[test]
    fn test_effective_mode_prefers_role_override() {
        let catalog = RoleCatalog::builtin();
        // Leader carries an approval_required override.
        assert_eq!(
            catalog.effective_mode(MembershipRole::Leader, AdvancementMode::Automatic),
            AdvancementMode::ApprovalRequired
        );
        // Member has no override, org-wide mode wins.
        assert_eq!(
            catalog.effective_mode(MembershipRole::Member, AdvancementMode::Automatic),
            AdvancementMode::Automatic
        );
        assert_eq!(
            catalog.effective_mode(MembershipRole::Member, AdvancementMode::ApprovalRequired),
            AdvancementMode::ApprovalRequired
        );
    }

    #[test]
    fn test_requirements_sorted_by_level() {
        let catalog = RoleCatalog::builtin();
        let levels: Vec<i64> = catalog.requirements.iter().map(|r| r.level).collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted);
    }
}
