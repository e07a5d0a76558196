//! Read-only venue access.
//!
//! One adapter per venue behind the `VenueApi` trait, a per-venue request
//! gate (token bucket + concurrency cap), a capability registry, and a
//! closed error taxonomy. The global detection path runs exclusively on the
//! platform's read-only credentials; user credentials never enter this
//! crate.

pub mod api;
pub mod binance;
pub mod bybit;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod okx;
pub mod registry;
pub mod types;

pub use api::VenueApi;
pub use error::VenueError;
pub use registry::VenueRegistry;
pub use types::{Capability, CapabilitySet, FeeSchedule, FundingRate, OrderBookTop, Pair, VenueId};
