//! Pairing and emission.
//!
//! Pure pairing logic over the final rate/fee maps, then an orchestration
//! entry point that runs the sweep, builds candidates and hands them to the
//! distribution queue in priority order.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tracing::{debug, info, instrument};

use exchange::registry::VenueRegistry;
use exchange::types::Pair;

use crate::config::DetectorConfig;
use crate::fetch::{SweepOutcome, run_sweep};
use crate::types::{Opportunity, OpportunityKind};

/// Build candidates from the sweep outcome. Deterministic: pairs are walked
/// in lexicographic order and venue pairings in configuration order.
pub fn pair_candidates(
    cfg: &DetectorConfig,
    sweep: &SweepOutcome,
    now_ms: u64,
) -> Vec<Opportunity> {
    let mut pairs: Vec<&Pair> = cfg.pairs.iter().collect();
    pairs.sort();
    pairs.dedup();

    let mut candidates = Vec::new();

    for pair in pairs {
        let Some(rates) = sweep.rates.get(pair) else {
            continue;
        };
        let fees = sweep.fees.get(pair);

        for (i, &venue_a) in cfg.venues.iter().enumerate() {
            for &venue_b in cfg.venues.iter().skip(i + 1) {
                let (Some(rate_a), Some(rate_b)) = (rates.get(&venue_a), rates.get(&venue_b))
                else {
                    continue;
                };

                // Long the lower funding rate, short the higher.
                let (long, short) = match rate_a.rate.cmp(&rate_b.rate) {
                    Ordering::Less => (rate_a, rate_b),
                    Ordering::Greater => (rate_b, rate_a),
                    // Equal rates carry no spread.
                    Ordering::Equal => continue,
                };

                // Fee completeness: no "assume zero" for a missing leg.
                let (Some(long_fee), Some(short_fee)) = (
                    fees.and_then(|f| f.get(&long.venue)),
                    fees.and_then(|f| f.get(&short.venue)),
                ) else {
                    debug!(
                        pair = %pair,
                        long = %long.venue,
                        short = %short.venue,
                        "taker fee missing on one leg; pairing skipped"
                    );
                    continue;
                };

                match Opportunity::try_new(
                    OpportunityKind::Arbitrage,
                    pair.clone(),
                    long.venue,
                    short.venue,
                    long.rate,
                    short.rate,
                    long_fee.taker,
                    short_fee.taker,
                    cfg.threshold,
                    now_ms,
                    cfg.opportunity_ttl_secs,
                    cfg.max_recipients,
                ) {
                    Ok(opp) => candidates.push(opp),
                    Err(reason) => {
                        debug!(pair = %pair, %reason, "pairing produced no candidate");
                    }
                }
            }
        }
    }

    // Priority descending; ties break on detection time then pair id. Within
    // one cycle detection times are equal, so the pair id decides.
    candidates.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.detected_at_ms.cmp(&b.detected_at_ms))
            .then_with(|| a.pair.cmp(&b.pair))
    });

    candidates
}

/// One detection cycle: sweep, pair, emit.
///
/// Returns the number of candidates handed to the queue. The receiver is the
/// distribution engine, which persists the durable mirror before any user
/// sees a candidate.
#[instrument(skip(registry, cfg, sink), fields(pairs = cfg.pairs.len(), venues = cfg.venues.len()))]
pub async fn run_cycle(
    registry: Arc<VenueRegistry>,
    cfg: &DetectorConfig,
    sink: &Sender<Opportunity>,
    now_ms: u64,
) -> anyhow::Result<usize> {
    let deadline: Duration = cfg.cycle_deadline();
    let sweep = run_sweep(Arc::clone(&registry), cfg, deadline, now_ms).await;

    let candidates = pair_candidates(cfg, &sweep, now_ms);
    let emitted = candidates.len();

    for opp in candidates {
        if sink.send(opp).await.is_err() {
            anyhow::bail!("distribution queue closed; detector cannot emit");
        }
    }

    info!(
        emitted,
        aborted_fetches = sweep.aborted,
        "detection cycle complete"
    );

    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Bps;
    use exchange::types::{FeeSchedule, FundingRate, VenueId};

    fn cfg(venues: Vec<VenueId>, threshold_bps: i64) -> DetectorConfig {
        DetectorConfig {
            venues,
            pairs: vec![Pair::new("BTC", "USDT")],
            threshold: Bps::new(threshold_bps),
            ..DetectorConfig::default()
        }
    }

    fn sweep() -> SweepOutcome {
        SweepOutcome::default()
    }

    fn add_rate(s: &mut SweepOutcome, venue: VenueId, pair: &Pair, bps: i64) {
        s.rates.entry(pair.clone()).or_default().insert(
            venue,
            FundingRate {
                venue,
                pair: pair.clone(),
                rate: Bps::new(bps),
                funding_time_ms: 0,
                observed_at_ms: 0,
            },
        );
    }

    fn add_fee(s: &mut SweepOutcome, venue: VenueId, pair: &Pair, taker_bps: i64) {
        s.fees.entry(pair.clone()).or_default().insert(
            venue,
            FeeSchedule {
                venue,
                pair: pair.clone(),
                maker: Bps::new(taker_bps),
                taker: Bps::new(taker_bps),
                observed_at_ms: 0,
            },
        );
    }

    /// Two venues, one pair: A=+5bps, B=-10bps, taker 10bps each,
    /// threshold 5bps. Net is 15-20 = -5bps: nothing may be emitted.
    #[test]
    fn fees_swallow_the_spread() {
        let pair = Pair::new("BTC", "USDT");
        let cfg = cfg(vec![VenueId::Binance, VenueId::Bybit], 5);

        let mut s = sweep();
        add_rate(&mut s, VenueId::Binance, &pair, 5);
        add_rate(&mut s, VenueId::Bybit, &pair, -10);
        add_fee(&mut s, VenueId::Binance, &pair, 10);
        add_fee(&mut s, VenueId::Bybit, &pair, 10);

        assert!(pair_candidates(&cfg, &s, 0).is_empty());
    }

    /// Same spread with 2bps takers: net 11bps clears the 5bps threshold,
    /// long on the negative-rate venue, score 11/5 = 2.2.
    #[test]
    fn thin_fees_emit_with_expected_fields() {
        let pair = Pair::new("BTC", "USDT");
        let cfg = cfg(vec![VenueId::Binance, VenueId::Bybit], 5);

        let mut s = sweep();
        add_rate(&mut s, VenueId::Binance, &pair, 5);
        add_rate(&mut s, VenueId::Bybit, &pair, -10);
        add_fee(&mut s, VenueId::Binance, &pair, 2);
        add_fee(&mut s, VenueId::Bybit, &pair, 2);

        let out = pair_candidates(&cfg, &s, 1_000);
        assert_eq!(out.len(), 1);

        let opp = &out[0];
        assert_eq!(opp.long_venue, VenueId::Bybit);
        assert_eq!(opp.short_venue, VenueId::Binance);
        assert_eq!(opp.long_rate, Bps::new(-10));
        assert_eq!(opp.short_rate, Bps::new(5));
        assert_eq!(opp.gross_difference, Bps::new(15));
        assert_eq!(opp.total_fee, Bps::new(4));
        assert_eq!(opp.net_rate_difference, Bps::new(11));
        assert!((opp.priority_score - 2.2).abs() < 1e-12);
        assert_eq!(opp.detected_at_ms, 1_000);
    }

    /// Three venues, one missing its fee: only the pairing with both fees
    /// present is considered.
    #[test]
    fn missing_fee_excludes_only_that_venues_pairings() {
        let pair = Pair::new("BTC", "USDT");
        let cfg = cfg(vec![VenueId::Binance, VenueId::Bybit, VenueId::Okx], 1);

        let mut s = sweep();
        add_rate(&mut s, VenueId::Binance, &pair, 20);
        add_rate(&mut s, VenueId::Bybit, &pair, 0);
        add_rate(&mut s, VenueId::Okx, &pair, -20);
        add_fee(&mut s, VenueId::Binance, &pair, 1);
        // Bybit fee missing
        add_fee(&mut s, VenueId::Okx, &pair, 1);

        let out = pair_candidates(&cfg, &s, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].long_venue, VenueId::Okx);
        assert_eq!(out[0].short_venue, VenueId::Binance);
    }

    #[test]
    fn equal_rates_produce_nothing() {
        let pair = Pair::new("BTC", "USDT");
        let cfg = cfg(vec![VenueId::Binance, VenueId::Bybit], 0);

        let mut s = sweep();
        add_rate(&mut s, VenueId::Binance, &pair, 7);
        add_rate(&mut s, VenueId::Bybit, &pair, 7);
        add_fee(&mut s, VenueId::Binance, &pair, 0);
        add_fee(&mut s, VenueId::Bybit, &pair, 0);

        assert!(pair_candidates(&cfg, &s, 0).is_empty());
    }

    #[test]
    fn missing_rate_excludes_the_pairing() {
        let pair = Pair::new("BTC", "USDT");
        let cfg = cfg(vec![VenueId::Binance, VenueId::Bybit], 1);

        let mut s = sweep();
        add_rate(&mut s, VenueId::Binance, &pair, 20);
        add_fee(&mut s, VenueId::Binance, &pair, 1);
        add_fee(&mut s, VenueId::Bybit, &pair, 1);

        assert!(pair_candidates(&cfg, &s, 0).is_empty());
    }

    #[test]
    fn output_is_sorted_by_priority_then_pair() {
        let btc = Pair::new("BTC", "USDT");
        let eth = Pair::new("ETH", "USDT");
        let cfg = DetectorConfig {
            venues: vec![VenueId::Binance, VenueId::Bybit],
            pairs: vec![eth.clone(), btc.clone()],
            threshold: Bps::new(5),
            ..DetectorConfig::default()
        };

        let mut s = sweep();
        // BTC: net 10bps (score 2.0)
        add_rate(&mut s, VenueId::Binance, &btc, 10);
        add_rate(&mut s, VenueId::Bybit, &btc, 0);
        add_fee(&mut s, VenueId::Binance, &btc, 0);
        add_fee(&mut s, VenueId::Bybit, &btc, 0);
        // ETH: net 30bps (score 6.0)
        add_rate(&mut s, VenueId::Binance, &eth, 30);
        add_rate(&mut s, VenueId::Bybit, &eth, 0);
        add_fee(&mut s, VenueId::Binance, &eth, 0);
        add_fee(&mut s, VenueId::Bybit, &eth, 0);

        let out = pair_candidates(&cfg, &s, 0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].pair, eth);
        assert_eq!(out[1].pair, btc);
    }

    #[test]
    fn score_ties_fall_back_to_lexicographic_pair() {
        let btc = Pair::new("BTC", "USDT");
        let eth = Pair::new("ETH", "USDT");
        let cfg = DetectorConfig {
            venues: vec![VenueId::Binance, VenueId::Bybit],
            pairs: vec![eth.clone(), btc.clone()],
            threshold: Bps::new(5),
            ..DetectorConfig::default()
        };

        let mut s = sweep();
        for pair in [&btc, &eth] {
            add_rate(&mut s, VenueId::Binance, pair, 10);
            add_rate(&mut s, VenueId::Bybit, pair, 0);
            add_fee(&mut s, VenueId::Binance, pair, 0);
            add_fee(&mut s, VenueId::Bybit, pair, 0);
        }

        let out = pair_candidates(&cfg, &s, 0);
        assert_eq!(out[0].pair, btc, "equal scores order by pair id");
        assert_eq!(out[1].pair, eth);
    }
}
