//! Shared types used by the distribution subsystem.

use profile::model::Tier;

/// Fairness knobs. These are global limits; per-user effective limits are
/// derived by multiplying `per_day` with the tier and group multipliers.
#[derive(Debug, Clone)]
pub struct FairnessConfig {
    /// Max opportunities one user may receive within a single
    /// distribution tick (a "burst").
    pub per_burst: u32,

    /// Base daily cap per user before multipliers.
    pub per_day: u32,

    /// Minimum elapsed time between two bursts for the same user.
    pub cooldown_secs: u64,

    pub tier_multipliers: TierMultipliers,

    /// Daily-cap scalar for users with a recent execution on record.
    pub activity_boost: f64,

    /// Daily-cap scalar for group contexts; applied once per (group, date).
    pub group_multiplier: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            per_burst: 2,
            per_day: 10,
            cooldown_secs: 4 * 60 * 60,
            tier_multipliers: TierMultipliers::default(),
            activity_boost: 1.2,
            group_multiplier: 2.0,
        }
    }
}

impl FairnessConfig {
    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_secs * 1000
    }

    /// Daily cap after tier, group and activity scaling, floored, never
    /// below one.
    pub fn effective_daily_limit(
        &self,
        tier: Tier,
        is_group_context: bool,
        recently_active: bool,
    ) -> u32 {
        let mut limit = self.per_day as f64 * self.tier_multipliers.for_tier(tier);
        if is_group_context {
            limit *= self.group_multiplier;
        }
        if recently_active {
            limit *= self.activity_boost;
        }
        (limit.floor() as u32).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierMultipliers {
    pub free: f64,
    pub premium: f64,
    pub auto: f64,
    pub enterprise: f64,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            free: 1.0,
            premium: 1.5,
            auto: 2.0,
            enterprise: 3.0,
        }
    }
}

impl TierMultipliers {
    pub fn for_tier(&self, tier: Tier) -> f64 {
        match TierClass::of(tier) {
            TierClass::Free => self.free,
            TierClass::Premium => self.premium,
            TierClass::Auto => self.auto,
            TierClass::Enterprise => self.enterprise,
        }
    }

    pub fn for_class(&self, class: TierClass) -> f64 {
        match class {
            TierClass::Free => self.free,
            TierClass::Premium => self.premium,
            TierClass::Auto => self.auto,
            TierClass::Enterprise => self.enterprise,
        }
    }
}

/// Fairness bucket a subscription tier falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TierClass {
    Free,
    Premium,
    Auto,
    Enterprise,
}

impl TierClass {
    pub const ALL: [TierClass; 4] = [
        TierClass::Enterprise,
        TierClass::Auto,
        TierClass::Premium,
        TierClass::Free,
    ];

    pub fn of(tier: Tier) -> Self {
        match tier {
            Tier::Free => TierClass::Free,
            Tier::PremiumArb | Tier::PremiumTech | Tier::Hybrid => TierClass::Premium,
            Tier::AutoArb | Tier::AutoTech => TierClass::Auto,
            Tier::Enterprise => TierClass::Enterprise,
        }
    }
}

/// Where a delivery lands: a private chat or a group/channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContext {
    pub context_id: String,
    pub chat_id: i64,
    pub is_group: bool,
}

impl DeliveryContext {
    pub fn private(chat_id: i64) -> Self {
        Self {
            context_id: format!("private:{chat_id}"),
            chat_id,
            is_group: false,
        }
    }

    pub fn group(group_id: i64) -> Self {
        Self {
            context_id: format!("group:{group_id}"),
            chat_id: group_id,
            is_group: true,
        }
    }
}
