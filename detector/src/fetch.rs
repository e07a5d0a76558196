//! Concurrent rate/fee sweep.
//!
//! One task per (pair, venue) fetches the funding rate and taker fee through
//! the registry; all tasks share a global token gate (pacing) and the gate's
//! concurrency cap. A failing fetch leaves a null slot for that (venue,
//! pair) only. The whole sweep runs under the cycle deadline; leftover
//! fetches are aborted and counted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use exchange::gate::TokenGate;
use exchange::registry::VenueRegistry;
use exchange::types::{Capability, FeeSchedule, FundingRate, Pair, VenueId};

use crate::config::DetectorConfig;

/// Final rate/fee maps for one cycle. Missing entries stayed null.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub rates: HashMap<Pair, HashMap<VenueId, FundingRate>>,
    pub fees: HashMap<Pair, HashMap<VenueId, FeeSchedule>>,
    /// Fetch tasks cancelled by the deadline.
    pub aborted: usize,
}

type SlotResult = (
    Pair,
    VenueId,
    Option<FundingRate>,
    Option<FeeSchedule>,
);

async fn fetch_slot(
    registry: Arc<VenueRegistry>,
    gate: Arc<TokenGate>,
    pair: Pair,
    venue: VenueId,
) -> SlotResult {
    let rate = {
        let _permit = gate.acquire().await;
        match registry.require(venue, Capability::FundingRates) {
            Ok(api) => match api.funding_rate(&pair).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(venue = %venue, pair = %pair, error = %e, "funding rate fetch failed; venue excluded for this pair");
                    None
                }
            },
            Err(e) => {
                debug!(venue = %venue, error = %e, "venue lacks funding rates");
                None
            }
        }
    };

    let fee = {
        let _permit = gate.acquire().await;
        match registry.require(venue, Capability::TakerFees) {
            Ok(api) => match api.taker_fee(&pair).await {
                Ok(f) => f,
                Err(e) => {
                    debug!(venue = %venue, pair = %pair, error = %e, "taker fee fetch failed; venue excluded for this pair");
                    None
                }
            },
            Err(e) => {
                debug!(venue = %venue, error = %e, "venue lacks fee schedules");
                None
            }
        }
    };

    (pair, venue, rate, fee)
}

/// Sweep every (pair, venue) slot within `deadline`.
pub async fn run_sweep(
    registry: Arc<VenueRegistry>,
    cfg: &DetectorConfig,
    deadline: Duration,
    now_ms: u64,
) -> SweepOutcome {
    let gate = Arc::new(TokenGate::new(
        cfg.global_rate_per_sec,
        cfg.max_concurrent_fetches,
        now_ms,
    ));

    let mut tasks: JoinSet<SlotResult> = JoinSet::new();
    let mut expected = 0usize;

    for pair in &cfg.pairs {
        for venue in &cfg.venues {
            tasks.spawn(fetch_slot(
                Arc::clone(&registry),
                Arc::clone(&gate),
                pair.clone(),
                *venue,
            ));
            expected += 1;
        }
    }

    let mut outcome = SweepOutcome::default();
    let mut completed = 0usize;

    let collect = async {
        while let Some(joined) = tasks.join_next().await {
            let Ok((pair, venue, rate, fee)) = joined else {
                continue;
            };
            completed += 1;

            if let Some(r) = rate {
                outcome.rates.entry(pair.clone()).or_default().insert(venue, r);
            }
            if let Some(f) = fee {
                outcome.fees.entry(pair).or_default().insert(venue, f);
            }
        }
    };

    if tokio::time::timeout(deadline, collect).await.is_err() {
        tasks.abort_all();
        outcome.aborted = expected - completed;
        warn!(
            aborted = outcome.aborted,
            completed,
            "sweep deadline reached; outstanding fetches cancelled"
        );
    }

    outcome
}
