use common::Bps;
use exchange::types::{Pair, VenueId};

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MIN_TTL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub venues: Vec<VenueId>,
    pub pairs: Vec<Pair>,

    /// Minimum net rate difference for a candidate to be emitted.
    pub threshold: Bps,

    pub interval_secs: u64,
    pub opportunity_ttl_secs: u64,
    pub max_recipients: u32,

    /// Global in-flight bound across all venues during a sweep.
    pub max_concurrent_fetches: usize,
    /// Global request pacing across all venues during a sweep.
    pub global_rate_per_sec: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            venues: Vec::new(),
            pairs: Vec::new(),
            threshold: Bps::new(5),
            interval_secs: 30,
            opportunity_ttl_secs: 300,
            max_recipients: 10,
            max_concurrent_fetches: 5,
            global_rate_per_sec: 10.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.venues.len() < 2 {
            anyhow::bail!("at least two venues are required for cross-venue pairing");
        }
        if self.pairs.is_empty() {
            anyhow::bail!("no monitored pairs configured");
        }
        if self.threshold.is_negative() {
            anyhow::bail!("threshold must be non-negative");
        }
        if self.interval_secs < MIN_INTERVAL_SECS {
            anyhow::bail!("detection interval must be >= {MIN_INTERVAL_SECS}s");
        }
        if self.opportunity_ttl_secs < MIN_TTL_SECS {
            anyhow::bail!("opportunity ttl must be >= {MIN_TTL_SECS}s");
        }
        if self.max_recipients == 0 {
            anyhow::bail!("max recipients must be positive");
        }
        Ok(())
    }

    /// Budget for one sweep: the full interval minus a one-second margin for
    /// pairing, persistence and enqueueing.
    pub fn cycle_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs.saturating_sub(1).max(1))
    }
}
