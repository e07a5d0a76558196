//! Token-bucket limiter.
//!
//! State is `{tokens, last_refill_ms}` per scope; each check refills by
//! `elapsed x rate` capped at capacity, then consumes. Invariant kept at
//! every observable point: `0 <= tokens <= capacity`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use store::kv::{KvStore, PutOptions};
use store::keys;

use crate::decision::Decision;

const CAS_ATTEMPTS: u32 = 5;
const STATE_TTL_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

pub struct TokenBucketLimiter {
    kv: Arc<dyn KvStore>,
}

impl TokenBucketLimiter {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Consume `cost` tokens from `scope`'s bucket.
    pub async fn check(
        &self,
        scope: &str,
        capacity: f64,
        refill_per_sec: f64,
        cost: f64,
        now_ms: u64,
    ) -> Decision {
        let capacity = capacity.max(1.0);
        let refill_per_sec = refill_per_sec.max(0.001);
        let cost = cost.max(0.0);

        let key = keys::bucket(scope);
        let opts = PutOptions::ttl_secs(STATE_TTL_SECS);

        for _ in 0..CAS_ATTEMPTS {
            let current_raw = match self.kv.get(&key, now_ms).await {
                Ok(v) => v,
                Err(e) => return fail_open(scope, &e),
            };

            let state = current_raw
                .as_deref()
                .and_then(|raw| serde_json::from_str::<BucketState>(raw).ok())
                .unwrap_or(BucketState {
                    tokens: capacity,
                    last_refill_ms: now_ms,
                });

            let elapsed_ms = now_ms.saturating_sub(state.last_refill_ms);
            let tokens =
                (state.tokens + elapsed_ms as f64 / 1000.0 * refill_per_sec).min(capacity);

            if tokens < cost {
                let deficit = cost - tokens;
                let retry_after_seconds = (deficit / refill_per_sec).ceil() as u64;
                return Decision::Denied {
                    retry_after_seconds: retry_after_seconds.max(1),
                };
            }

            let next_state = BucketState {
                tokens: (tokens - cost).max(0.0),
                last_refill_ms: now_ms,
            };
            let next = match serde_json::to_string(&next_state) {
                Ok(v) => v,
                Err(e) => {
                    warn!(scope = %scope, error = %e, "bucket encode failed; admitting");
                    return Decision::Allowed {
                        remaining: next_state.tokens as u32,
                        reset_at_ms: now_ms,
                    };
                }
            };

            match self
                .kv
                .compare_and_swap(&key, current_raw.as_deref(), &next, opts.clone(), now_ms)
                .await
            {
                Ok(true) => {
                    let to_full_ms =
                        ((capacity - next_state.tokens) / refill_per_sec * 1000.0) as u64;
                    return Decision::Allowed {
                        remaining: next_state.tokens.floor() as u32,
                        reset_at_ms: now_ms + to_full_ms,
                    };
                }
                Ok(false) => continue,
                Err(e) => return fail_open(scope, &e),
            }
        }

        warn!(scope = %scope, "token-bucket CAS contention exhausted; admitting");
        Decision::Allowed {
            remaining: 0,
            reset_at_ms: now_ms,
        }
    }
}

fn fail_open(scope: &str, e: &store::kv::KvError) -> Decision {
    warn!(scope = %scope, error = %e, "limiter store failure; failing open without state update");
    Decision::Allowed {
        remaining: 0,
        reset_at_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::MemoryKv;

    fn limiter() -> TokenBucketLimiter {
        TokenBucketLimiter::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn bucket_starts_full_and_drains() {
        let l = limiter();

        for _ in 0..10 {
            assert!(l.check("v", 10.0, 1.0, 1.0, 0).await.is_allowed());
        }
        let d = l.check("v", 10.0, 1.0, 1.0, 0).await;
        assert_eq!(d, Decision::Denied { retry_after_seconds: 1 });
    }

    #[tokio::test]
    async fn refill_restores_capacity_over_time() {
        let l = limiter();

        for _ in 0..10 {
            assert!(l.check("v", 10.0, 2.0, 1.0, 0).await.is_allowed());
        }
        assert!(!l.check("v", 10.0, 2.0, 1.0, 0).await.is_allowed());

        // 2 tokens/s: after 1.5s there are 3 tokens.
        assert!(l.check("v", 10.0, 2.0, 3.0, 1_500).await.is_allowed());
        assert!(!l.check("v", 10.0, 2.0, 1.0, 1_500).await.is_allowed());
    }

    #[tokio::test]
    async fn refill_caps_at_capacity() {
        let l = limiter();

        assert!(l.check("v", 5.0, 100.0, 1.0, 0).await.is_allowed());

        // A week of idle time must not bank more than capacity.
        let week_ms = 7 * 24 * 60 * 60 * 1000;
        for _ in 0..5 {
            assert!(l.check("v", 5.0, 100.0, 1.0, week_ms).await.is_allowed());
        }
        assert!(!l.check("v", 5.0, 100.0, 1.0, week_ms).await.is_allowed());
    }

    #[tokio::test]
    async fn denied_requests_do_not_consume() {
        let l = limiter();

        assert!(l.check("v", 2.0, 0.001, 2.0, 0).await.is_allowed());

        // Repeated denials leave the bucket untouched.
        for _ in 0..5 {
            assert!(!l.check("v", 2.0, 0.001, 1.0, 1).await.is_allowed());
        }
    }
}
