//! Fair distribution of detected opportunities.
//!
//! For each market tick's candidates it:
//!   1. Mirrors the opportunity durably before anyone can receive it.
//!   2. Screens every known user through pure eligibility rules.
//!   3. Picks recipients with weighted round-robin across tiers plus an
//!      activity-boost re-pass.
//!   4. Claims the recipient slot and the user's daily quota with CAS
//!      against the durable ledger; a conflict skips the user, never the
//!      cycle.
//!   5. Demotes group-context deliveries to a public-safe summary before
//!      anything reaches the router.

pub mod eligibility;
pub mod engine;
pub mod ledger;
pub mod policy;
pub mod queue;
pub mod state;
pub mod types;

pub use engine::DistributionEngine;
pub use ledger::QuotaLedger;
pub use queue::OpportunityQueue;
pub use types::{DeliveryContext, FairnessConfig, TierClass};
