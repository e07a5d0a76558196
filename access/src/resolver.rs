//! Permission resolution: tier x role x beta x feature flags.

use tracing::warn;

use profile::model::{Role, Tier, UserProfile};

use crate::permission::{Permission, PermissionSet};

#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    pub ai_enhanced_enabled: bool,
    pub beta_program_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            ai_enhanced_enabled: false,
            beta_program_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingPermission(Permission),
    ProfileArchived,
    /// Profile store unreachable and the requested permission is not part of
    /// the degraded surface.
    StoreUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Full permission set for a profile at `now_ms`.
pub fn resolve(
    tier: Tier,
    role: Role,
    beta_active: bool,
    flags: &FeatureFlags,
) -> PermissionSet {
    let mut set = PermissionSet::empty().with(Permission::BasicOpportunities);

    set = match tier {
        Tier::Free => set,
        Tier::PremiumArb | Tier::PremiumTech | Tier::Hybrid => set
            .with(Permission::AdvancedAnalytics)
            .with(Permission::ManualTrading),
        Tier::AutoArb | Tier::AutoTech => set
            .with(Permission::AdvancedAnalytics)
            .with(Permission::ManualTrading)
            .with(Permission::AutomatedTrading),
        Tier::Enterprise => set
            .with(Permission::AdvancedAnalytics)
            .with(Permission::ManualTrading)
            .with(Permission::AutomatedTrading)
            .with(Permission::AiEnhancedOpportunities),
    };

    if beta_active && flags.beta_program_enabled {
        set = set.with(Permission::BetaAccess);
        if flags.ai_enhanced_enabled {
            set = set.with(Permission::AiEnhancedOpportunities);
        }
    }

    if matches!(role, Role::Admin | Role::SuperAdmin) {
        set = set.with(Permission::SystemAdministration);
    }

    set
}

/// Gate a single permission for a live profile.
pub fn check(
    user: &UserProfile,
    permission: Permission,
    now_ms: u64,
    flags: &FeatureFlags,
) -> Decision {
    if user.archived {
        return Decision::Deny(DenyReason::ProfileArchived);
    }

    let set = resolve(user.tier, user.role, user.beta_active(now_ms), flags);
    if set.contains(permission) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::MissingPermission(permission))
    }
}

/// Degraded-mode gate for when the profile store is unavailable.
///
/// Non-admin paths fall back to the basic read surface only. Administrative
/// permissions fail closed unless the caller proves SuperAdmin out-of-band
/// (e.g. a pinned operator identity).
pub fn check_degraded(permission: Permission, confirmed_super_admin: bool) -> Decision {
    match permission {
        Permission::BasicOpportunities => Decision::Allow,
        Permission::SystemAdministration if confirmed_super_admin => {
            warn!("admin action allowed via confirmed SuperAdmin while profile store is down");
            Decision::Allow
        }
        _ => Decision::Deny(DenyReason::StoreUnavailable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(tier: Tier, role: Role, beta_expires_at_ms: u64) -> UserProfile {
        let mut p = UserProfile::new_first_contact(1, 0);
        p.tier = tier;
        p.role = role;
        p.beta_expires_at_ms = beta_expires_at_ms;
        p
    }

    #[test]
    fn free_tier_gets_basic_only() {
        let set = resolve(Tier::Free, Role::User, false, &FeatureFlags::default());
        assert!(set.contains(Permission::BasicOpportunities));
        assert!(!set.contains(Permission::AdvancedAnalytics));
        assert!(!set.contains(Permission::ManualTrading));
        assert!(!set.contains(Permission::SystemAdministration));
    }

    #[test]
    fn premium_tiers_unlock_analytics_and_manual_trading() {
        for tier in [Tier::PremiumArb, Tier::PremiumTech, Tier::Hybrid] {
            let set = resolve(tier, Role::User, false, &FeatureFlags::default());
            assert!(set.contains(Permission::AdvancedAnalytics), "{tier}");
            assert!(set.contains(Permission::ManualTrading), "{tier}");
            assert!(!set.contains(Permission::AutomatedTrading), "{tier}");
        }
    }

    #[test]
    fn auto_tiers_unlock_automated_trading() {
        for tier in [Tier::AutoArb, Tier::AutoTech] {
            let set = resolve(tier, Role::User, false, &FeatureFlags::default());
            assert!(set.contains(Permission::AutomatedTrading), "{tier}");
            assert!(!set.contains(Permission::AiEnhancedOpportunities), "{tier}");
        }
    }

    #[test]
    fn enterprise_gets_ai_enhanced() {
        let set = resolve(Tier::Enterprise, Role::User, false, &FeatureFlags::default());
        assert!(set.contains(Permission::AiEnhancedOpportunities));
    }

    #[test]
    fn beta_grants_are_flag_gated() {
        let flags_on = FeatureFlags {
            ai_enhanced_enabled: true,
            beta_program_enabled: true,
        };
        let set = resolve(Tier::Free, Role::User, true, &flags_on);
        assert!(set.contains(Permission::BetaAccess));
        assert!(set.contains(Permission::AiEnhancedOpportunities));

        let flags_off = FeatureFlags {
            ai_enhanced_enabled: true,
            beta_program_enabled: false,
        };
        let set = resolve(Tier::Free, Role::User, true, &flags_off);
        assert!(!set.contains(Permission::BetaAccess));
        assert!(!set.contains(Permission::AiEnhancedOpportunities));
    }

    #[test]
    fn admin_roles_carry_system_administration() {
        for role in [Role::Admin, Role::SuperAdmin] {
            let set = resolve(Tier::Free, role, false, &FeatureFlags::default());
            assert!(set.contains(Permission::SystemAdministration));
        }
    }

    #[test]
    fn beta_expiry_is_enforced_through_check() {
        let p = profile(Tier::Free, Role::User, 5_000);
        let flags = FeatureFlags {
            ai_enhanced_enabled: false,
            beta_program_enabled: true,
        };

        assert!(check(&p, Permission::BetaAccess, 4_999, &flags).is_allowed());
        assert_eq!(
            check(&p, Permission::BetaAccess, 5_000, &flags),
            Decision::Deny(DenyReason::MissingPermission(Permission::BetaAccess))
        );
    }

    #[test]
    fn archived_profiles_are_denied_everything() {
        let mut p = profile(Tier::Enterprise, Role::SuperAdmin, 0);
        p.archived = true;

        assert_eq!(
            check(&p, Permission::BasicOpportunities, 0, &FeatureFlags::default()),
            Decision::Deny(DenyReason::ProfileArchived)
        );
    }

    #[test]
    fn degraded_mode_allows_basic_and_fails_closed_on_admin() {
        assert!(check_degraded(Permission::BasicOpportunities, false).is_allowed());

        assert_eq!(
            check_degraded(Permission::SystemAdministration, false),
            Decision::Deny(DenyReason::StoreUnavailable)
        );
        assert!(check_degraded(Permission::SystemAdministration, true).is_allowed());

        assert_eq!(
            check_degraded(Permission::ManualTrading, true),
            Decision::Deny(DenyReason::StoreUnavailable)
        );
    }
}
