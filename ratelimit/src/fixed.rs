//! Fixed-window counter.
//!
//! Key is `rate:{scope}:{floor(now/window)}`; the counter is advanced with a
//! CAS loop so concurrent checks over-admit at most one request across a
//! window boundary. Entries carry a TTL of twice the window so dead windows
//! age out on their own.

use std::sync::Arc;

use tracing::warn;

use store::kv::{KvStore, PutOptions};
use store::keys;

use crate::decision::Decision;

const CAS_ATTEMPTS: u32 = 5;

pub struct FixedWindowLimiter {
    kv: Arc<dyn KvStore>,
}

impl FixedWindowLimiter {
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
        let window_secs = window_secs.max(1);
        let now_secs = now_ms / 1000;
        let window_index = now_secs / window_secs;
        let window_end_ms = (window_index + 1) * window_secs * 1000;

        let key = keys::rate_window(scope, window_index);
        let opts = PutOptions::ttl_secs(window_secs * 2);

        for _ in 0..CAS_ATTEMPTS {
            let current_raw = match self.kv.get(&key, now_ms).await {
                Ok(v) => v,
                Err(e) => return fail_open(scope, &e),
            };

            let count: u32 = current_raw
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            if count >= limit {
                let retry_after_seconds = (window_end_ms.saturating_sub(now_ms)).div_ceil(1000);
                return Decision::Denied {
                    retry_after_seconds: retry_after_seconds.max(1),
                };
            }

            let next = (count + 1).to_string();
            match self
                .kv
                .compare_and_swap(&key, current_raw.as_deref(), &next, opts.clone(), now_ms)
                .await
            {
                Ok(true) => {
                    return Decision::Allowed {
                        remaining: limit - (count + 1),
                        reset_at_ms: window_end_ms,
                    };
                }
                Ok(false) => continue,
                Err(e) => return fail_open(scope, &e),
            }
        }

        // Heavy contention: admit rather than starve; the off-by-one window
        // tolerance covers this.
        warn!(scope = %scope, "fixed-window CAS contention exhausted; admitting");
        Decision::Allowed {
            remaining: 0,
            reset_at_ms: window_end_ms,
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
