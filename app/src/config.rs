//! Process configuration, environment-driven with documented defaults.

use std::str::FromStr;

use common::Bps;
use distributor::FairnessConfig;
use distributor::types::TierMultipliers;
use exchange::types::{Pair, VenueId};

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string (sqlite or postgres).
    pub database_url: String,

    // =========================
    // Detection configuration
    // =========================
    /// Venues swept each cycle. At least two are required for pairing.
    pub monitored_venues: Vec<VenueId>,

    /// Instruments swept each cycle.
    pub monitored_pairs: Vec<Pair>,

    /// Minimum net rate difference (after both taker legs) to emit.
    pub threshold: Bps,

    /// Detection cadence. The sweep itself is bounded to one second less,
    /// so a slow venue can never push a cycle into the next tick.
    pub detection_interval_secs: u64,

    /// How long an emitted opportunity stays deliverable.
    pub opportunity_ttl_secs: u64,

    /// Hard per-opportunity recipient cap.
    pub max_recipients_per_opportunity: u32,

    // =========================
    // Fairness configuration
    // =========================
    pub fairness: FairnessConfig,

    // =========================
    // Rate limiting
    // =========================
    /// Per-route request limits; consumed by the HTTP ingress port.
    pub rate_limit_rules: Vec<ratelimit::RouteLimit>,

    // =========================
    // Platform plumbing
    // =========================
    /// Opaque handle the credential vault derives its sealing key from.
    pub encryption_key_ref: String,

    /// error|warn|info|debug; forwarded into the tracing env filter when
    /// RUST_LOG is not set.
    pub log_level: String,

    /// Emit JSON log lines instead of the pretty format.
    pub log_json: bool,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_list<T, E>(raw: &str, parse: impl Fn(&str) -> Result<T, E>) -> Vec<T> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| parse(s).ok())
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://arbd_dev.db".to_string());

        let venues_raw =
            std::env::var("MONITORED_VENUES").unwrap_or_else(|_| "binance,bybit,okx".to_string());
        let pairs_raw = std::env::var("MONITORED_PAIRS")
            .unwrap_or_else(|_| "BTC/USDT,ETH/USDT,SOL/USDT".to_string());

        // Threshold arrives as a decimal fraction (e.g. 0.0005) and is
        // converted to bps at this boundary.
        let threshold_fraction: f64 = env_or("DETECTION_THRESHOLD", 0.0005);
        let threshold = Bps::from_fraction(threshold_fraction).unwrap_or(Bps::new(5));

        Self {
            database_url,
            monitored_venues: parse_list(&venues_raw, VenueId::from_str),
            monitored_pairs: parse_list(&pairs_raw, Pair::parse),
            threshold,
            detection_interval_secs: env_or("DETECTION_INTERVAL_SECS", 30u64).max(5),
            opportunity_ttl_secs: env_or("OPPORTUNITY_TTL_SECS", 300u64).max(60),
            max_recipients_per_opportunity: env_or("MAX_RECIPIENTS", 10u32).max(1),
            fairness: FairnessConfig {
                per_burst: env_or("FAIRNESS_PER_BURST", 2u32),
                per_day: env_or("FAIRNESS_PER_DAY", 10u32),
                cooldown_secs: env_or("FAIRNESS_COOLDOWN_SECS", 4 * 60 * 60),
                tier_multipliers: TierMultipliers::default(),
                activity_boost: env_or("FAIRNESS_ACTIVITY_BOOST", 1.2f64),
                group_multiplier: env_or("FAIRNESS_GROUP_MULTIPLIER", 2.0f64),
            },
            rate_limit_rules: ratelimit::RouteTable::default_rules(),
            encryption_key_ref: std::env::var("ENCRYPTION_KEY_REF")
                .unwrap_or_else(|_| "local-dev-key".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env_or("LOG_JSON", false),
        }
    }

    pub fn detector_config(&self) -> detector::DetectorConfig {
        detector::DetectorConfig {
            venues: self.monitored_venues.clone(),
            pairs: self.monitored_pairs.clone(),
            threshold: self.threshold,
            interval_secs: self.detection_interval_secs,
            opportunity_ttl_secs: self.opportunity_ttl_secs,
            max_recipients: self.max_recipients_per_opportunity,
            ..detector::DetectorConfig::default()
        }
    }
}
