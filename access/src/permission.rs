use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    BasicOpportunities,
    AdvancedAnalytics,
    ManualTrading,
    AutomatedTrading,
    AiEnhancedOpportunities,
    SystemAdministration,
    BetaAccess,
}

impl Permission {
    pub const ALL: [Permission; 7] = [
        Permission::BasicOpportunities,
        Permission::AdvancedAnalytics,
        Permission::ManualTrading,
        Permission::AutomatedTrading,
        Permission::AiEnhancedOpportunities,
        Permission::SystemAdministration,
        Permission::BetaAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::BasicOpportunities => "BasicOpportunities",
            Permission::AdvancedAnalytics => "AdvancedAnalytics",
            Permission::ManualTrading => "ManualTrading",
            Permission::AutomatedTrading => "AutomatedTrading",
            Permission::AiEnhancedOpportunities => "AIEnhancedOpportunities",
            Permission::SystemAdministration => "SystemAdministration",
            Permission::BetaAccess => "BetaAccess",
        }
    }

    const fn bit(self) -> u16 {
        match self {
            Permission::BasicOpportunities => 1 << 0,
            Permission::AdvancedAnalytics => 1 << 1,
            Permission::ManualTrading => 1 << 2,
            Permission::AutomatedTrading => 1 << 3,
            Permission::AiEnhancedOpportunities => 1 << 4,
            Permission::SystemAdministration => 1 << 5,
            Permission::BetaAccess => 1 << 6,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionSet(u16);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, p: Permission) -> Self {
        Self(self.0 | p.bit())
    }

    pub const fn contains(self, p: Permission) -> bool {
        self.0 & p.bit() != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for p in self.iter() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(p.as_str())?;
            first = false;
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_membership_and_union() {
        let a = PermissionSet::empty().with(Permission::BasicOpportunities);
        let b = PermissionSet::empty().with(Permission::ManualTrading);
        let u = a.union(b);

        assert!(u.contains(Permission::BasicOpportunities));
        assert!(u.contains(Permission::ManualTrading));
        assert!(!u.contains(Permission::SystemAdministration));
        assert_eq!(u.iter().count(), 2);
    }

    #[test]
    fn display_lists_granted_permissions() {
        let set = PermissionSet::empty()
            .with(Permission::BasicOpportunities)
            .with(Permission::BetaAccess);
        let rendered = set.to_string();
        assert!(rendered.contains("BasicOpportunities"));
        assert!(rendered.contains("BetaAccess"));
        assert_eq!(PermissionSet::empty().to_string(), "(none)");
    }
}
