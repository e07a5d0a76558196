//! The read-only venue contract.

use async_trait::async_trait;

use crate::error::VenueError;
use crate::types::{
    CapabilitySet, FeeSchedule, FundingRate, Market, OrderBookTop, Pair, VenueId,
};

pub type VenueResult<T> = Result<T, VenueError>;

/// Uniform read-only access to one venue.
///
/// `Ok(None)` means the venue answered but has no data for the pair (e.g.
/// unlisted instrument); errors are the closed `VenueError` taxonomy. A
/// failing venue is reported per pair and never aborts a caller's cycle.
#[async_trait]
pub trait VenueApi: Send + Sync {
    fn venue(&self) -> VenueId;

    fn capabilities(&self) -> CapabilitySet;

    async fn funding_rate(&self, pair: &Pair) -> VenueResult<Option<FundingRate>>;

    /// Batch convenience; the default fans out sequentially. Adapters with a
    /// bulk endpoint override this.
    async fn funding_rates(&self, pairs: &[Pair]) -> VenueResult<Vec<FundingRate>> {
        let mut out = Vec::with_capacity(pairs.len());
        for pair in pairs {
            if let Some(fr) = self.funding_rate(pair).await? {
                out.push(fr);
            }
        }
        Ok(out)
    }

    async fn taker_fee(&self, pair: &Pair) -> VenueResult<Option<FeeSchedule>>;

    async fn order_book_top(&self, pair: &Pair) -> VenueResult<Option<OrderBookTop>>;

    async fn markets(&self) -> VenueResult<Vec<Market>>;
}

impl std::fmt::Debug for dyn VenueApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("dyn VenueApi").field(&self.venue()).finish()
    }
}
