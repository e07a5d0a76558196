//! Storage layer.
//!
//! Two tiers, matching how the rest of the workspace uses state:
//!   • a typed key-value contract (`KvStore`) for hot-path counters,
//!     sessions and caches, with TTL, metadata and a CAS primitive;
//!   • a relational pool (`Db`) for durable records: profiles, opportunity
//!     mirrors, per-user ledgers and the audit log.
//!
//! Everything above this crate talks to traits; the sqlx and in-memory
//! implementations live here.

pub mod backoff;
pub mod db;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod sql_kv;

pub use db::Db;
pub use kv::{KvEntry, KvError, KvStore, ListOptions, ListPage, PutOptions, Ttl};
pub use memory::MemoryKv;
pub use sql_kv::SqlKv;
