//! Opportunity model with construction-time invariants.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use common::Bps;
use exchange::types::{Pair, VenueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpportunityKind {
    Arbitrage,
    Technical,
    AiEnhanced,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityKind::Arbitrage => "Arbitrage",
            OpportunityKind::Technical => "Technical",
            OpportunityKind::AiEnhanced => "AiEnhanced",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OpportunityError {
    #[error("long and short venue must differ")]
    SameVenue,

    #[error("short rate must strictly exceed long rate")]
    RateOrderViolated,

    #[error("net difference {net} below threshold {threshold}")]
    BelowThreshold { net: Bps, threshold: Bps },

    #[error("expiry must lie after detection time")]
    BadExpiry,

    #[error("max recipients must be positive")]
    NoRecipientCapacity,
}

/// A funding-rate spread between two venues that survives taker fees.
///
/// Long the cheap-funding venue, short the expensive one; the carry earned
/// is the rate spread minus both taker legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub kind: OpportunityKind,
    pub pair: Pair,
    pub long_venue: VenueId,
    pub short_venue: VenueId,
    pub long_rate: Bps,
    pub short_rate: Bps,
    pub gross_difference: Bps,
    pub long_taker: Bps,
    pub short_taker: Bps,
    pub total_fee: Bps,
    pub net_rate_difference: Bps,
    pub priority_score: f64,
    pub detected_at_ms: u64,
    pub expires_at_ms: u64,
    pub max_recipients: u32,
    pub current_recipients: u32,
}

impl Opportunity {
    /// Validating constructor; every invariant the queue and distributor
    /// rely on is enforced here, not downstream.
    #[allow(clippy::too_many_arguments)]
    pub fn try_new(
        kind: OpportunityKind,
        pair: Pair,
        long_venue: VenueId,
        short_venue: VenueId,
        long_rate: Bps,
        short_rate: Bps,
        long_taker: Bps,
        short_taker: Bps,
        threshold: Bps,
        detected_at_ms: u64,
        ttl_secs: u64,
        max_recipients: u32,
    ) -> Result<Self, OpportunityError> {
        if long_venue == short_venue {
            return Err(OpportunityError::SameVenue);
        }
        if short_rate <= long_rate {
            return Err(OpportunityError::RateOrderViolated);
        }
        if max_recipients == 0 {
            return Err(OpportunityError::NoRecipientCapacity);
        }
        if ttl_secs == 0 {
            return Err(OpportunityError::BadExpiry);
        }

        let gross = short_rate.saturating_sub(long_rate).abs();
        let total_fee = long_taker.saturating_add(short_taker);
        let net = gross.saturating_sub(total_fee);

        if net < threshold {
            return Err(OpportunityError::BelowThreshold { net, threshold });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            pair,
            long_venue,
            short_venue,
            long_rate,
            short_rate,
            gross_difference: gross,
            long_taker,
            short_taker,
            total_fee,
            net_rate_difference: net,
            priority_score: priority_score(net, threshold),
            detected_at_ms,
            expires_at_ms: detected_at_ms + ttl_secs * 1000,
            max_recipients,
            current_recipients: 0,
        })
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn has_capacity(&self) -> bool {
        self.current_recipients < self.max_recipients
    }
}

/// `clamp(net / threshold, 0, 10)`; a zero threshold saturates to the top
/// of the scale for any positive net.
pub fn priority_score(net: Bps, threshold: Bps) -> f64 {
    if threshold.raw() <= 0 {
        return if net.raw() > 0 { 10.0 } else { 0.0 };
    }
    net.ratio(threshold).clamp(0.0, 10.0)
}
