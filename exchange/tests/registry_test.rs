use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use common::Bps;
use exchange::api::{VenueApi, VenueResult};
use exchange::registry::VenueRegistry;
use exchange::types::{
    Capability, CapabilitySet, FeeSchedule, FundingRate, Market, OrderBookTop, Pair, VenueId,
};
use exchange::VenueError;

/// Minimal scripted venue for registry behaviour tests.
struct FakeVenue {
    id: VenueId,
    caps: CapabilitySet,
    markets_calls: AtomicU32,
}

impl FakeVenue {
    fn new(id: VenueId, caps: CapabilitySet) -> Self {
        Self {
            id,
            caps,
            markets_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl VenueApi for FakeVenue {
    fn venue(&self) -> VenueId {
        self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        self.caps
    }

    async fn funding_rate(&self, pair: &Pair) -> VenueResult<Option<FundingRate>> {
        Ok(Some(FundingRate {
            venue: self.id,
            pair: pair.clone(),
            rate: Bps::new(5),
            funding_time_ms: 0,
            observed_at_ms: 0,
        }))
    }

    async fn taker_fee(&self, _pair: &Pair) -> VenueResult<Option<FeeSchedule>> {
        Ok(None)
    }

    async fn order_book_top(&self, _pair: &Pair) -> VenueResult<Option<OrderBookTop>> {
        Ok(None)
    }

    async fn markets(&self) -> VenueResult<Vec<Market>> {
        self.markets_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Market {
            pair: Pair::new("BTC", "USDT"),
            native_symbol: "BTCUSDT".into(),
            active: true,
        }])
    }
}

#[tokio::test]
async fn unregistered_venue_is_not_supported() {
    let registry = VenueRegistry::new();

    match registry.get(VenueId::Binance) {
        Err(VenueError::NotSupported(_)) => {}
        other => panic!("expected NotSupported, got {other:?}"),
    }
}

#[tokio::test]
async fn capability_gate_rejects_before_any_call() {
    let mut registry = VenueRegistry::new();
    let caps = CapabilitySet::empty().with(Capability::FundingRates);
    registry.register(Arc::new(FakeVenue::new(VenueId::Bybit, caps)));

    assert!(registry.require(VenueId::Bybit, Capability::FundingRates).is_ok());

    match registry.require(VenueId::Bybit, Capability::TakerFees) {
        Err(VenueError::NotSupported(msg)) => assert!(msg.contains("taker_fees")),
        other => panic!("expected NotSupported, got {other:?}"),
    }
}

#[tokio::test]
async fn markets_catalogue_is_cached_for_ttl() {
    let fake = Arc::new(FakeVenue::new(VenueId::Okx, CapabilitySet::all()));
    let mut registry = VenueRegistry::new().with_markets_ttl_ms(1_000);
    registry.register(Arc::clone(&fake) as Arc<dyn VenueApi>);

    let m1 = registry.markets(VenueId::Okx, 0).await.unwrap();
    let m2 = registry.markets(VenueId::Okx, 500).await.unwrap();
    assert_eq!(m1.len(), 1);
    assert_eq!(m2.len(), 1);
    assert_eq!(fake.markets_calls.load(Ordering::SeqCst), 1, "second read hits cache");

    // Past the TTL the catalogue refreshes.
    registry.markets(VenueId::Okx, 2_000).await.unwrap();
    assert_eq!(fake.markets_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidation_forces_refresh() {
    let fake = Arc::new(FakeVenue::new(VenueId::Binance, CapabilitySet::all()));
    let mut registry = VenueRegistry::new();
    registry.register(Arc::clone(&fake) as Arc<dyn VenueApi>);

    registry.markets(VenueId::Binance, 0).await.unwrap();
    registry.invalidate_markets(VenueId::Binance).await;
    registry.markets(VenueId::Binance, 1).await.unwrap();

    assert_eq!(fake.markets_calls.load(Ordering::SeqCst), 2);
}
