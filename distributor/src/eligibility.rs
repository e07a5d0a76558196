//! Determines whether a user may receive a given opportunity.
//
//  This module is deliberately pure: no async, no IO. The engine assembles a
//  `CandidateView` from live state and every rule is applied here so the
//  decision is unit-testable in isolation.

use access::{Permission, PermissionSet};
use detector::types::OpportunityKind;
use profile::preferences::{Preferences, TradingFocus};

use crate::types::FairnessConfig;

/// Result of an eligibility check. Denial reasons are recorded verbatim in
/// the analytics ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    SessionInactive,
    FocusMismatch,
    MissingPermission,
    DailyCapExceeded,
    CooldownActive,
    PairExcluded,
    AlreadyDelivered,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Eligibility::Eligible => "Eligible",
            Eligibility::SessionInactive => "SessionInactive",
            Eligibility::FocusMismatch => "FocusMismatch",
            Eligibility::MissingPermission => "MissingPermission",
            Eligibility::DailyCapExceeded => "DailyCapExceeded",
            Eligibility::CooldownActive => "CooldownActive",
            Eligibility::PairExcluded => "PairExcluded",
            Eligibility::AlreadyDelivered => "AlreadyDelivered",
        }
    }
}

/// Everything the rules need to know about one (opportunity, user) pairing.
#[derive(Debug, Clone)]
pub struct CandidateView {
    pub session_active: bool,
    pub preferences: Preferences,
    pub permissions: PermissionSet,

    /// Deliveries of this kind already recorded today in this context.
    pub received_today: u32,
    pub effective_daily_limit: u32,

    /// Last successful delivery to this user, any context.
    pub last_delivery_ms: Option<u64>,
    /// Deliveries granted to this user within the current tick.
    pub deliveries_this_tick: u32,

    pub already_delivered: bool,
}

fn focus_accepts(focus: TradingFocus, kind: OpportunityKind) -> bool {
    match focus {
        TradingFocus::Hybrid => true,
        TradingFocus::Arbitrage => {
            matches!(kind, OpportunityKind::Arbitrage | OpportunityKind::AiEnhanced)
        }
        TradingFocus::Technical => {
            matches!(kind, OpportunityKind::Technical | OpportunityKind::AiEnhanced)
        }
    }
}

fn required_permission(kind: OpportunityKind) -> Permission {
    match kind {
        OpportunityKind::Arbitrage => Permission::BasicOpportunities,
        OpportunityKind::Technical => Permission::AdvancedAnalytics,
        OpportunityKind::AiEnhanced => Permission::AiEnhancedOpportunities,
    }
}

/// Check whether this user may receive *one* more delivery of `kind` for
/// `pair_id` at `now_ms`.
pub fn check_candidate(
    view: &CandidateView,
    kind: OpportunityKind,
    pair_id: &str,
    cfg: &FairnessConfig,
    now_ms: u64,
) -> Eligibility {
    if view.already_delivered {
        return Eligibility::AlreadyDelivered;
    }

    if !view.session_active {
        return Eligibility::SessionInactive;
    }

    if !focus_accepts(view.preferences.trading_focus, kind) {
        return Eligibility::FocusMismatch;
    }

    // Basic read access is the floor for every kind.
    if !view.permissions.contains(Permission::BasicOpportunities)
        || !view.permissions.contains(required_permission(kind))
    {
        return Eligibility::MissingPermission;
    }

    if !view.preferences.wants_pair(pair_id) {
        return Eligibility::PairExcluded;
    }

    if view.received_today >= view.effective_daily_limit {
        return Eligibility::DailyCapExceeded;
    }

    // Burst-or-cooldown: inside a tick up to `per_burst` deliveries pass;
    // across ticks the cooldown gate applies.
    if view.deliveries_this_tick > 0 {
        if view.deliveries_this_tick >= cfg.per_burst {
            return Eligibility::CooldownActive;
        }
    } else if let Some(last) = view.last_delivery_ms {
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < cfg.cooldown_ms() {
            return Eligibility::CooldownActive;
        }
    }

    Eligibility::Eligible
}
