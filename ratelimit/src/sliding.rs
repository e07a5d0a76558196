//! Sliding-window limiter.
//!
//! Stores the timestamps of admitted requests per scope; entries older than
//! the window are discarded on every check. More precise than the fixed
//! window at the cost of one JSON list per scope.

use std::sync::Arc;

use tracing::warn;

use store::kv::{KvStore, PutOptions};
use store::keys;

use crate::decision::Decision;

const CAS_ATTEMPTS: u32 = 5;

pub struct SlidingWindowLimiter {
    kv: Arc<dyn KvStore>,
}

impl SlidingWindowLimiter {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn check(
        &self,
        scope: &str,
        limit: u32,
        window_secs: u64,
        now_ms: u64,
    ) -> Decision {
        let window_ms = window_secs.max(1) * 1000;
        let key = keys::sliding(scope);
        let opts = PutOptions::ttl_secs(window_secs.max(1) * 2);

        for _ in 0..CAS_ATTEMPTS {
            let current_raw = match self.kv.get(&key, now_ms).await {
                Ok(v) => v,
                Err(e) => return fail_open(scope, &e),
            };

            let mut stamps: Vec<u64> = current_raw
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();

            let cutoff = now_ms.saturating_sub(window_ms);
            stamps.retain(|&t| t > cutoff);

            if stamps.len() >= limit as usize {
                // Oldest surviving stamp decides when capacity frees up.
                let oldest = stamps.iter().copied().min().unwrap_or(now_ms);
                let retry_after_seconds =
                    (oldest + window_ms).saturating_sub(now_ms).div_ceil(1000);
                return Decision::Denied {
                    retry_after_seconds: retry_after_seconds.max(1),
                };
            }

            stamps.push(now_ms);
            let next = match serde_json::to_string(&stamps) {
                Ok(v) => v,
                Err(e) => {
                    warn!(scope = %scope, error = %e, "sliding window encode failed; admitting");
                    return Decision::Allowed {
                        remaining: 0,
                        reset_at_ms: now_ms + window_ms,
                    };
                }
            };

            match self
                .kv
                .compare_and_swap(&key, current_raw.as_deref(), &next, opts.clone(), now_ms)
                .await
            {
                Ok(true) => {
                    return Decision::Allowed {
                        remaining: limit - stamps.len() as u32,
                        reset_at_ms: now_ms + window_ms,
                    };
                }
                Ok(false) => continue,
                Err(e) => return fail_open(scope, &e),
            }
        }

        warn!(scope = %scope, "sliding-window CAS contention exhausted; admitting");
        Decision::Allowed {
            remaining: 0,
            reset_at_ms: now_ms + window_ms,
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
