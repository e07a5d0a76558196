//! Append-only audit ledger.
//!
//! Records detections, distribution attempts (including the denial reason),
//! execution outcomes and rate-limit denials into `audit_log`. Nothing here
//! is ever updated in place; retention sweeps delete by age according to
//! the per-action policy (detections 30 days, distributions 90 days,
//! executions kept indefinitely).

pub mod ledger;

pub use ledger::{AuditAction, AuditLedger};
