//! Replicated kv tier over the relational pool.
//!
//! The table is deliberately flat (`key`, `value`, `metadata`,
//! `expires_at_ms`) so the same statements run on sqlite in tests and
//! postgres in production. CAS is a conditional UPDATE/INSERT checked via
//! `rows_affected`, the same discipline the repositories use.

use async_trait::async_trait;
use sqlx::{AnyPool, Row};

use crate::backoff::{BackoffPolicy, with_backoff};
use crate::kv::{KvEntry, KvError, KvResult, KvStore, ListOptions, ListPage, PutOptions};

pub struct SqlKv {
    pool: AnyPool,
    backoff: BackoffPolicy,
}

impl SqlKv {
    pub fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            backoff: BackoffPolicy::default(),
        }
    }

    pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS kv_entries (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  metadata TEXT,
  expires_at_ms BIGINT
);
"#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Delete entries whose expiry passed. Runs on the maintenance tick.
    pub async fn purge_expired(&self, now_ms: u64) -> KvResult<u64> {
        let res = sqlx::query(
            "DELETE FROM kv_entries WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?",
        )
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| KvError::Io(e.into()))?;

        Ok(res.rows_affected())
    }

    async fn fetch_live(&self, key: &str, now_ms: u64) -> KvResult<Option<KvEntry>> {
        let row = sqlx::query(
            r#"
SELECT value, metadata, expires_at_ms
FROM kv_entries
WHERE key = ? AND (expires_at_ms IS NULL OR expires_at_ms > ?)
"#,
        )
        .bind(key)
        .bind(now_ms as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| KvError::Io(e.into()))?;

        let Some(row) = row else { return Ok(None) };

        let value: String = row.get("value");
        let metadata_raw: Option<String> = row.get("metadata");
        let expires_at_ms: Option<i64> = row.get("expires_at_ms");

        let metadata = metadata_raw.and_then(|m| match serde_json::from_str(&m) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "corrupted kv metadata; dropping");
                None
            }
        });

        Ok(Some(KvEntry {
            value,
            metadata,
            expires_at_ms: expires_at_ms.map(|v| v as u64),
        }))
    }
}

fn is_retryable(e: &KvError) -> bool {
    // Serialization problems are caller bugs; only I/O is retried.
    matches!(e, KvError::Io(_))
}

#[async_trait]
impl KvStore for SqlKv {
    async fn get(&self, key: &str, now_ms: u64) -> KvResult<Option<String>> {
        let entry = with_backoff("kv_get", self.backoff, is_retryable, || {
            self.fetch_live(key, now_ms)
        })
        .await?;
        Ok(entry.map(|e| e.value))
    }

    async fn get_with_metadata(&self, key: &str, now_ms: u64) -> KvResult<Option<KvEntry>> {
        with_backoff("kv_get_with_metadata", self.backoff, is_retryable, || {
            self.fetch_live(key, now_ms)
        })
        .await
    }

    async fn put(&self, key: &str, value: &str, opts: PutOptions, now_ms: u64) -> KvResult<()> {
        let expires_at = opts.ttl.map(|t| t.expires_at_ms(now_ms) as i64);
        let metadata = match &opts.metadata {
            Some(m) => Some(serde_json::to_string(m)?),
            None => None,
        };

        // Portable upsert: UPDATE first, INSERT if nothing matched.
        let mut tx = self.pool.begin().await.map_err(|e| KvError::Io(e.into()))?;

        let updated = sqlx::query(
            "UPDATE kv_entries SET value = ?, metadata = ?, expires_at_ms = ? WHERE key = ?",
        )
        .bind(value)
        .bind(metadata.as_deref())
        .bind(expires_at)
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(|e| KvError::Io(e.into()))?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO kv_entries (key, value, metadata, expires_at_ms) VALUES (?, ?, ?, ?)",
            )
            .bind(key)
            .bind(value)
            .bind(metadata.as_deref())
            .bind(expires_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| KvError::Io(e.into()))?;
        }

        tx.commit().await.map_err(|e| KvError::Io(e.into()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| KvError::Io(e.into()))?;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> KvResult<u64> {
        let mut removed = 0;
        for key in keys {
            let res = sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(|e| KvError::Io(e.into()))?;
            removed += res.rows_affected();
        }
        Ok(removed)
    }

    async fn list(&self, opts: ListOptions, now_ms: u64) -> KvResult<ListPage> {
        let limit = if opts.limit == 0 { 100 } else { opts.limit };
        let start = opts.cursor.clone().unwrap_or_else(|| opts.prefix.clone());

        // Fetch one extra row to learn whether a next page exists.
        let rows = sqlx::query(
            r#"
SELECT key FROM kv_entries
WHERE key >= ? AND (expires_at_ms IS NULL OR expires_at_ms > ?)
ORDER BY key
LIMIT ?
"#,
        )
        .bind(&start)
        .bind(now_ms as i64)
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| KvError::Io(e.into()))?;

        let mut keys: Vec<String> = Vec::with_capacity(limit);
        let mut cursor = None;

        for row in rows {
            let k: String = row.get("key");
            if !k.starts_with(&opts.prefix) {
                break;
            }
            if keys.len() == limit {
                cursor = Some(k);
                break;
            }
            keys.push(k);
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
        let expires_at = opts.ttl.map(|t| t.expires_at_ms(now_ms) as i64);
        let metadata = match &opts.metadata {
            Some(m) => Some(serde_json::to_string(m)?),
            None => None,
        };

        match expected {
            Some(want) => {
                let res = sqlx::query(
                    r#"
UPDATE kv_entries
SET value = ?, metadata = ?, expires_at_ms = ?
WHERE key = ? AND value = ?
  AND (expires_at_ms IS NULL OR expires_at_ms > ?)
"#,
                )
                .bind(next)
                .bind(metadata.as_deref())
                .bind(expires_at)
                .bind(key)
                .bind(want)
                .bind(now_ms as i64)
                .execute(&self.pool)
                .await
                .map_err(|e| KvError::Io(e.into()))?;

                Ok(res.rows_affected() == 1)
            }
            None => {
                // Create-if-absent. An expired row counts as absent, so clear
                // it first inside the transaction.
                let mut tx = self.pool.begin().await.map_err(|e| KvError::Io(e.into()))?;

                sqlx::query(
                    "DELETE FROM kv_entries WHERE key = ? AND expires_at_ms IS NOT NULL AND expires_at_ms <= ?",
                )
                .bind(key)
                .bind(now_ms as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| KvError::Io(e.into()))?;

                let res = sqlx::query(
                    r#"
INSERT INTO kv_entries (key, value, metadata, expires_at_ms)
SELECT ?, ?, ?, ?
WHERE NOT EXISTS (SELECT 1 FROM kv_entries WHERE key = ?)
"#,
                )
                .bind(key)
                .bind(next)
                .bind(metadata.as_deref())
                .bind(expires_at)
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(|e| KvError::Io(e.into()))?;

                tx.commit().await.map_err(|e| KvError::Io(e.into()))?;
                Ok(res.rows_affected() == 1)
            }
        }
    }
}
