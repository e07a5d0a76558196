//! Venue registry and markets catalogue cache.
//!
//! The registry is the single entry point the detector uses: it owns the
//! adapter instances, answers capability questions before any network call,
//! and caches each venue's markets catalogue for five minutes under a
//! single-writer discipline (last write wins, TTL bounded).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::{VenueApi, VenueResult};
use crate::error::VenueError;
use crate::types::{Capability, Market, VenueId};

pub const MARKETS_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

#[derive(Clone)]
struct CachedCatalogue {
    markets: Arc<Vec<Market>>,
    fetched_at_ms: u64,
}

pub struct VenueRegistry {
    venues: HashMap<VenueId, Arc<dyn VenueApi>>,
    markets_cache: RwLock<HashMap<VenueId, CachedCatalogue>>,
    markets_ttl_ms: u64,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self {
            venues: HashMap::new(),
            markets_cache: RwLock::new(HashMap::new()),
            markets_ttl_ms: MARKETS_CACHE_TTL_MS,
        }
    }

    pub fn with_markets_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.markets_ttl_ms = ttl_ms;
        self
    }

    pub fn register(&mut self, venue: Arc<dyn VenueApi>) {
        info!(venue = %venue.venue(), "venue registered");
        self.venues.insert(venue.venue(), venue);
    }

    pub fn venue_ids(&self) -> Vec<VenueId> {
        self.venues.keys().copied().collect()
    }

    pub fn get(&self, venue: VenueId) -> VenueResult<Arc<dyn VenueApi>> {
        self.venues
            .get(&venue)
            .cloned()
            .ok_or_else(|| VenueError::NotSupported(format!("venue {venue} not configured")))
    }

    /// Capability gate: resolve the adapter only if it declares `cap`.
    pub fn require(&self, venue: VenueId, cap: Capability) -> VenueResult<Arc<dyn VenueApi>> {
        let api = self.get(venue)?;
        if !api.capabilities().contains(cap) {
            return Err(VenueError::NotSupported(format!(
                "venue {venue} lacks {}",
                cap.as_str()
            )));
        }
        Ok(api)
    }

    /// Markets catalogue with a 5-minute TTL cache per venue.
    pub async fn markets(&self, venue: VenueId, now_ms: u64) -> VenueResult<Arc<Vec<Market>>> {
        {
            let cache = self.markets_cache.read().await;
            if let Some(entry) = cache.get(&venue) {
                if now_ms.saturating_sub(entry.fetched_at_ms) < self.markets_ttl_ms {
                    return Ok(Arc::clone(&entry.markets));
                }
            }
        }

        let api = self.require(venue, Capability::MarketsCatalogue)?;
        let fresh = Arc::new(api.markets().await?);

        debug!(venue = %venue, count = fresh.len(), "markets catalogue refreshed");

        let mut cache = self.markets_cache.write().await;
        cache.insert(
            venue,
            CachedCatalogue {
                markets: Arc::clone(&fresh),
                fetched_at_ms: now_ms,
            },
        );

        Ok(fresh)
    }

    /// Drop a venue's cached catalogue (admin override or credential change).
    pub async fn invalidate_markets(&self, venue: VenueId) {
        let mut cache = self.markets_cache.write().await;
        if cache.remove(&venue).is_some() {
            info!(venue = %venue, "markets catalogue invalidated");
        }
    }
}

impl Default for VenueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
