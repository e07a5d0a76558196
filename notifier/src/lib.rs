//! Context-aware notification routing.
//!
//! Trade-sensitive payload kinds only ever reach private channels; the
//! policy gate here is the last line of defence and refuses rather than
//! downgrades (downgrading is the distributor's decision). Delivery retries
//! transient failures with exponential backoff and reports terminal
//! failures to the caller for ledger recording.

pub mod policy;
pub mod render;
pub mod router;
pub mod types;

pub use policy::{RoutePolicy, route_policy};
pub use render::{escape_chat_markup, render_opportunity, render_public_summary};
pub use router::{ChatEgress, NotificationRouter, Notifier};
pub use types::{ChannelTarget, NotifyError, PayloadKind, RenderedMessage};
