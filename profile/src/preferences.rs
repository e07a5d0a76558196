//! User preferences as a versioned tagged record.
//!
//! The JSON column stores a `version` tag; old payloads are migrated by
//! explicit per-version functions at read time, so the rest of the system
//! only ever sees the latest shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingFocus {
    Arbitrage,
    Technical,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomationLevel {
    Manual,
    SemiAuto,
    FullAuto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Fixed notional per leg, in quote units.
    FixedNotional { amount: u64 },
    /// Percentage of available balance, 1..=100.
    PercentBalance { percent: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    PrivateChat,
    GroupChat,
    Email,
}

/// Latest preference shape (v2). v1 predates pair allow/deny lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub trading_focus: TradingFocus,
    pub automation: AutomationLevel,
    pub risk_tolerance: RiskTolerance,
    pub sizing: PositionSizing,
    pub channels: Vec<NotificationChannel>,
    pub pair_allow: Vec<String>,
    pub pair_deny: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            trading_focus: TradingFocus::Arbitrage,
            automation: AutomationLevel::Manual,
            risk_tolerance: RiskTolerance::Moderate,
            sizing: PositionSizing::PercentBalance { percent: 5 },
            channels: vec![NotificationChannel::PrivateChat],
            pair_allow: Vec::new(),
            pair_deny: Vec::new(),
        }
    }
}

impl Preferences {
    /// Does this user want `pair`? Empty allow list means "everything not
    /// denied"; the deny list always wins.
    pub fn wants_pair(&self, pair_id: &str) -> bool {
        if self.pair_deny.iter().any(|p| p == pair_id) {
            return false;
        }
        self.pair_allow.is_empty() || self.pair_allow.iter().any(|p| p == pair_id)
    }
}

#[derive(Debug, Deserialize)]
struct PreferencesV1 {
    trading_focus: TradingFocus,
    automation: AutomationLevel,
    risk_tolerance: RiskTolerance,
    sizing: PositionSizing,
    channels: Vec<NotificationChannel>,
}

/// Stored envelope, discriminated by the version tag.
#[derive(Debug, Deserialize)]
#[serde(tag = "version")]
enum StoredPreferences {
    #[serde(rename = "1")]
    V1(PreferencesV1),
    #[serde(rename = "2")]
    V2(Preferences),
}

#[derive(Debug, Serialize)]
struct StoredLatest<'a> {
    version: &'static str,
    #[serde(flatten)]
    body: &'a Preferences,
}

fn migrate_v1(v1: PreferencesV1) -> Preferences {
    Preferences {
        trading_focus: v1.trading_focus,
        automation: v1.automation,
        risk_tolerance: v1.risk_tolerance,
        sizing: v1.sizing,
        channels: v1.channels,
        pair_allow: Vec::new(),
        pair_deny: Vec::new(),
    }
}

/// Parse a stored JSON payload, migrating older versions to the latest.
pub fn parse_and_migrate(raw: &str) -> anyhow::Result<Preferences> {
    let stored: StoredPreferences = serde_json::from_str(raw)?;
    Ok(match stored {
        StoredPreferences::V1(v1) => migrate_v1(v1),
        StoredPreferences::V2(latest) => latest,
    })
}

/// Serialize with the current version tag.
pub fn to_stored_json(prefs: &Preferences) -> anyhow::Result<String> {
    Ok(serde_json::to_string(&StoredLatest {
        version: "2",
        body: prefs,
    })?)
}
