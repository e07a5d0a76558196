//! Bounded retry with capped exponential backoff for transient store I/O.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial: Duration::from_millis(50),
            cap: Duration::from_millis(800),
        }
    }
}

/// Retry `op` while it reports a retryable failure, sleeping between
/// attempts. The final error is returned unchanged.
pub async fn with_backoff<T, E, F, Fut, R>(
    label: &'static str,
    policy: BackoffPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut delay = policy.initial;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                warn!(
                    label = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient store failure; retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.cap);
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("loop returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);

        let out: Result<u32, String> =
            with_backoff("test", BackoffPolicy::default(), |_| true, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err("flaky".to_string()) } else { Ok(n) }
            })
            .await;

        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_surface_immediately() {
        let calls = AtomicU32::new(0);

        let out: Result<(), String> =
            with_backoff("test", BackoffPolicy::default(), |_| false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            })
            .await;

        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let out: Result<(), String> =
            with_backoff("test", BackoffPolicy::default(), |_| true, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("flaky".to_string())
            })
            .await;

        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
