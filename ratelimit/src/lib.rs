//! Request rate limiting over the kv store.
//!
//! Three strategies share one decision shape: fixed window for cheap
//! per-route gating, sliding window where boundary bursts matter, and token
//! bucket for sustained-rate control. All state lives in the kv tier under
//! the `rate:*`, `sliding:*` and `bucket:*` namespaces; a limiter store
//! failure fails open with a warning and never turns into a 5xx by itself.

pub mod bucket;
pub mod decision;
pub mod fixed;
pub mod sliding;
pub mod table;

pub use bucket::TokenBucketLimiter;
pub use decision::Decision;
pub use fixed::FixedWindowLimiter;
pub use sliding::SlidingWindowLimiter;
pub use table::{RouteLimit, RouteTable, Scope};
