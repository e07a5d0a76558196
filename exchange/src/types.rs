//! Venue-facing data model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common::Bps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Binance,
    Bybit,
    Okx,
}

impl VenueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::Binance => "binance",
            VenueId::Bybit => "bybit",
            VenueId::Okx => "okx",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(VenueId::Binance),
            "bybit" => Ok(VenueId::Bybit),
            "okx" => Ok(VenueId::Okx),
            other => Err(anyhow::anyhow!("unknown venue id: {}", other)),
        }
    }
}

/// Perpetual instrument, venue-neutral. Adapters translate to their native
/// symbol form (`BTCUSDT`, `BTC-USDT-SWAP`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Parse "BTC/USDT".
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("pair must be BASE/QUOTE, got {s}"))?;
        if base.is_empty() || quote.is_empty() {
            anyhow::bail!("pair must be BASE/QUOTE, got {s}");
        }
        Ok(Self::new(base, quote))
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Immutable funding-rate snapshot for one (venue, pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub venue: VenueId,
    pub pair: Pair,
    pub rate: Bps,
    /// When this funding interval settles, per the venue.
    pub funding_time_ms: u64,
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub venue: VenueId,
    pub pair: Pair,
    pub maker: Bps,
    pub taker: Bps,
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookTop {
    pub venue: VenueId,
    pub pair: Pair,
    pub best_bid: f64,
    pub best_ask: f64,
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub pair: Pair,
    pub native_symbol: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    FundingRates,
    TakerFees,
    OrderBookTop,
    MarketsCatalogue,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FundingRates => "funding_rates",
            Capability::TakerFees => "taker_fees",
            Capability::OrderBookTop => "order_book_top",
            Capability::MarketsCatalogue => "markets_catalogue",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Capability::FundingRates => 1 << 0,
            Capability::TakerFees => 1 << 1,
            Capability::OrderBookTop => 1 << 2,
            Capability::MarketsCatalogue => 1 << 3,
        }
    }
}

/// Small capability bitset. Absence of a capability means the call is
/// rejected as `NotSupported` before any request is made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(
            Capability::FundingRates.bit()
                | Capability::TakerFees.bit()
                | Capability::OrderBookTop.bit()
                | Capability::MarketsCatalogue.bit(),
        )
    }

    pub const fn with(self, c: Capability) -> Self {
        Self(self.0 | c.bit())
    }

    pub const fn contains(self, c: Capability) -> bool {
        self.0 & c.bit() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_id_round_trip() {
        for v in [VenueId::Binance, VenueId::Bybit, VenueId::Okx] {
            assert_eq!(v.as_str().parse::<VenueId>().unwrap(), v);
        }
        assert!("ftx".parse::<VenueId>().is_err());
    }

    #[test]
    fn pair_parse() {
        let p = Pair::parse("BTC/USDT").unwrap();
        assert_eq!(p.base, "BTC");
        assert_eq!(p.quote, "USDT");
        assert_eq!(p.id(), "BTC/USDT");

        assert!(Pair::parse("BTCUSDT").is_err());
        assert!(Pair::parse("/USDT").is_err());
    }

    #[test]
    fn capability_set_membership() {
        let set = CapabilitySet::empty()
            .with(Capability::FundingRates)
            .with(Capability::TakerFees);

        assert!(set.contains(Capability::FundingRates));
        assert!(set.contains(Capability::TakerFees));
        assert!(!set.contains(Capability::OrderBookTop));
        assert!(CapabilitySet::all().contains(Capability::MarketsCatalogue));
    }
}
