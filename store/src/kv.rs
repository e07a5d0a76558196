//! The key-value contract.
//!
//! Keys are colon-separated namespaces (see `keys`). Values are UTF-8 text;
//! JSON payloads ride on top via the `get_json`/`put_json` helpers. A value
//! whose JSON fails to parse is reported as absent and logged, never as an
//! error: a corrupted cache entry must not take down a request path.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv i/o failure: {0}")]
    Io(#[from] anyhow::Error),

    #[error("kv serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type KvResult<T> = Result<T, KvError>;

/// Time-to-live for a stored entry. Whichever variant is set is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Entry expires `secs` seconds after the write.
    RelativeSeconds(u64),
    /// Entry expires at an absolute unix timestamp in seconds.
    AbsoluteSeconds(u64),
}

impl Ttl {
    /// Resolve to an absolute expiry in milliseconds, given the write time.
    pub fn expires_at_ms(self, now_ms: u64) -> u64 {
        match self {
            Ttl::RelativeSeconds(secs) => now_ms.saturating_add(secs.saturating_mul(1000)),
            Ttl::AbsoluteSeconds(at) => at.saturating_mul(1000),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub ttl: Option<Ttl>,
    pub metadata: Option<serde_json::Value>,
}

impl PutOptions {
    pub fn ttl_secs(secs: u64) -> Self {
        Self {
            ttl: Some(Ttl::RelativeSeconds(secs)),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KvEntry {
    pub value: String,
    pub metadata: Option<serde_json::Value>,
    pub expires_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: String,
    pub cursor: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Present when more keys remain; pass back as `ListOptions::cursor`.
    pub cursor: Option<String>,
}

/// Typed get/put/list/delete with TTL, metadata and compare-and-swap.
///
/// `now_ms` is threaded through every call so expiry decisions are
/// deterministic under test.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str, now_ms: u64) -> KvResult<Option<String>>;

    async fn get_with_metadata(&self, key: &str, now_ms: u64) -> KvResult<Option<KvEntry>>;

    async fn put(&self, key: &str, value: &str, opts: PutOptions, now_ms: u64) -> KvResult<()>;

    async fn delete(&self, key: &str) -> KvResult<()>;

    async fn delete_many(&self, keys: &[String]) -> KvResult<u64>;

    async fn list(&self, opts: ListOptions, now_ms: u64) -> KvResult<ListPage>;

    /// Atomic conditional write. `expected` of `None` means "create only if
    /// absent". Returns whether the swap was applied.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        next: &str,
        opts: PutOptions,
        now_ms: u64,
    ) -> KvResult<bool>;
}

/// JSON read on top of the text contract. Corrupted payloads are dropped
/// with a warning (see module docs).
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
    now_ms: u64,
) -> KvResult<Option<T>> {
    let Some(raw) = store.get(key, now_ms).await? else {
        return Ok(None);
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(key = %key, error = %e, "corrupted JSON value in kv store; treating as absent");
            Ok(None)
        }
    }
}

pub async fn put_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    opts: PutOptions,
    now_ms: u64,
) -> KvResult<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw, opts, now_ms).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_ttl_resolves_from_write_time() {
        let t = Ttl::RelativeSeconds(120);
        assert_eq!(t.expires_at_ms(1_000), 121_000);
    }

    #[test]
    fn absolute_ttl_ignores_write_time() {
        let t = Ttl::AbsoluteSeconds(1_700_000_000);
        assert_eq!(t.expires_at_ms(99), 1_700_000_000_000);
    }
}
