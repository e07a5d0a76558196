//! In-process kv implementation.
//!
//! Backs the hot cache tier and every unit test. Expiry is evaluated on
//! read; a periodic `purge_expired` keeps the map bounded in long runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::kv::{KvEntry, KvResult, KvStore, ListOptions, ListPage, PutOptions};

#[derive(Debug, Clone)]
struct Stored {
    value: String,
    metadata: Option<serde_json::Value>,
    expires_at_ms: Option<u64>,
}

impl Stored {
    fn live(&self, now_ms: u64) -> bool {
        match self.expires_at_ms {
            Some(at) => now_ms < at,
            None => true,
        }
    }
}

/// BTreeMap keeps `list` ordered so cursors are stable.
#[derive(Default)]
pub struct MemoryKv {
    inner: Mutex<BTreeMap<String, Stored>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every expired entry. Invoked from the maintenance tick.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut g = self.inner.lock();
        let before = g.len();
        g.retain(|_, v| v.live(now_ms));
        before - g.len()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str, now_ms: u64) -> KvResult<Option<String>> {
        let mut g = self.inner.lock();
        match g.get(key) {
            Some(s) if s.live(now_ms) => Ok(Some(s.value.clone())),
            Some(_) => {
                g.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn get_with_metadata(&self, key: &str, now_ms: u64) -> KvResult<Option<KvEntry>> {
        let mut g = self.inner.lock();
        match g.get(key) {
            Some(s) if s.live(now_ms) => Ok(Some(KvEntry {
                value: s.value.clone(),
                metadata: s.metadata.clone(),
                expires_at_ms: s.expires_at_ms,
            })),
            Some(_) => {
                g.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, opts: PutOptions, now_ms: u64) -> KvResult<()> {
        let stored = Stored {
            value: value.to_string(),
            metadata: opts.metadata,
            expires_at_ms: opts.ttl.map(|t| t.expires_at_ms(now_ms)),
        };
        self.inner.lock().insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> KvResult<u64> {
        let mut g = self.inner.lock();
        let mut removed = 0;
        for k in keys {
            if g.remove(k).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list(&self, opts: ListOptions, now_ms: u64) -> KvResult<ListPage> {
        let limit = if opts.limit == 0 { 100 } else { opts.limit };
        let g = self.inner.lock();

        let start = opts.cursor.unwrap_or_else(|| opts.prefix.clone());

        let mut keys = Vec::with_capacity(limit);
        let mut cursor = None;

        for (k, v) in g.range(start..) {
            if !k.starts_with(&opts.prefix) {
                break;
            }
            if !v.live(now_ms) {
                continue;
            }
            if keys.len() == limit {
                cursor = Some(k.clone());
                break;
            }
            keys.push(k.clone());
        }

        Ok(ListPage { keys, cursor })
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        next: &str,
        opts: PutOptions,
        now_ms: u64,
    ) -> KvResult<bool> {
        let mut g = self.inner.lock();

        let current = g.get(key).filter(|s| s.live(now_ms)).map(|s| s.value.as_str());
        if current != expected {
            return Ok(false);
        }

        g.insert(
            key.to_string(),
            Stored {
                value: next.to_string(),
                metadata: opts.metadata,
                expires_at_ms: opts.ttl.map(|t| t.expires_at_ms(now_ms)),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Ttl;

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let kv = MemoryKv::new();
        kv.put("k", "v", PutOptions::ttl_secs(10), 1_000).await.unwrap();

        assert_eq!(kv.get("k", 5_000).await.unwrap().as_deref(), Some("v"));
        assert_eq!(kv.get("k", 11_001).await.unwrap(), None);
    }

    #[tokio::test]
    async fn absolute_ttl_is_honoured() {
        let kv = MemoryKv::new();
        let opts = PutOptions {
            ttl: Some(Ttl::AbsoluteSeconds(100)),
            metadata: None,
        };
        kv.put("k", "v", opts, 1_000).await.unwrap();

        assert!(kv.get("k", 99_999).await.unwrap().is_some());
        assert!(kv.get("k", 100_001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cas_create_only_if_absent() {
        let kv = MemoryKv::new();

        assert!(
            kv.compare_and_swap("k", None, "1", PutOptions::default(), 0)
                .await
                .unwrap()
        );
        // second create must lose
        assert!(
            !kv.compare_and_swap("k", None, "2", PutOptions::default(), 0)
                .await
                .unwrap()
        );
        assert_eq!(kv.get("k", 0).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn cas_swaps_only_on_expected_value() {
        let kv = MemoryKv::new();
        kv.put("k", "1", PutOptions::default(), 0).await.unwrap();

        assert!(
            !kv.compare_and_swap("k", Some("0"), "2", PutOptions::default(), 0)
                .await
                .unwrap()
        );
        assert!(
            kv.compare_and_swap("k", Some("1"), "2", PutOptions::default(), 0)
                .await
                .unwrap()
        );
        assert_eq!(kv.get("k", 0).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn cas_treats_expired_entry_as_absent() {
        let kv = MemoryKv::new();
        kv.put("k", "1", PutOptions::ttl_secs(1), 0).await.unwrap();

        assert!(
            kv.compare_and_swap("k", None, "2", PutOptions::default(), 2_000)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn list_pages_through_prefix() {
        let kv = MemoryKv::new();
        for i in 0..5 {
            kv.put(&format!("opp:active:{i}"), "x", PutOptions::default(), 0)
                .await
                .unwrap();
        }
        kv.put("other:1", "x", PutOptions::default(), 0).await.unwrap();

        let p1 = kv
            .list(
                ListOptions {
                    prefix: "opp:active:".into(),
                    cursor: None,
                    limit: 3,
                },
                0,
            )
            .await
            .unwrap();
        assert_eq!(p1.keys.len(), 3);
        assert!(p1.cursor.is_some());

        let p2 = kv
            .list(
                ListOptions {
                    prefix: "opp:active:".into(),
                    cursor: p1.cursor,
                    limit: 3,
                },
                0,
            )
            .await
            .unwrap();
        assert_eq!(p2.keys.len(), 2);
        assert!(p2.cursor.is_none());
    }

    #[tokio::test]
    async fn purge_expired_bounds_the_map() {
        let kv = MemoryKv::new();
        kv.put("a", "1", PutOptions::ttl_secs(1), 0).await.unwrap();
        kv.put("b", "1", PutOptions::default(), 0).await.unwrap();

        assert_eq!(kv.purge_expired(5_000), 1);
        assert_eq!(kv.len(), 1);
    }
}
