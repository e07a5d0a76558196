//! Permission resolution and gating.
//!
//! Permissions form a closed set derived from (tier, role, beta state,
//! feature flags). Command and route handlers ask `check`; when the profile
//! store is unreachable they ask `check_degraded`, which grants only the
//! basic read surface and fails closed on anything administrative.

pub mod permission;
pub mod resolver;

pub use permission::{Permission, PermissionSet};
pub use resolver::{Decision, DenyReason, FeatureFlags, check, check_degraded, resolve};
