//! Per-venue request gate.
//!
//! Two limits compose: a token bucket bounding sustained request rate and a
//! semaphore bounding in-flight concurrency. Every adapter call holds a
//! permit from both for its duration.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_RATE_PER_SEC: f64 = 10.0;
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

pub struct TokenGate {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<BucketState>,
    concurrency: Arc<Semaphore>,
}

/// Held for the lifetime of one venue request.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl TokenGate {
    pub fn new(rate_per_sec: f64, max_concurrent: usize, now_ms: u64) -> Self {
        let capacity = rate_per_sec.max(1.0);
        Self {
            capacity,
            refill_per_sec: rate_per_sec.max(0.1),
            bucket: Mutex::new(BucketState {
                tokens: capacity,
                last_refill_ms: now_ms,
            }),
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn with_defaults(now_ms: u64) -> Self {
        Self::new(DEFAULT_RATE_PER_SEC, DEFAULT_MAX_CONCURRENT, now_ms)
    }

    /// Try to take one token without waiting. Returns the wait until the next
    /// token on failure.
    fn try_take(&self, now_ms: u64) -> Result<(), Duration> {
        let mut b = self.bucket.lock();

        let elapsed_ms = now_ms.saturating_sub(b.last_refill_ms);
        b.tokens =
            (b.tokens + elapsed_ms as f64 / 1000.0 * self.refill_per_sec).min(self.capacity);
        b.last_refill_ms = now_ms;

        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - b.tokens;
            let wait_ms = (deficit / self.refill_per_sec * 1000.0).ceil() as u64;
            Err(Duration::from_millis(wait_ms.max(1)))
        }
    }

    /// Acquire a rate token and a concurrency slot, sleeping as needed.
    pub async fn acquire(&self) -> GatePermit {
        let permit = Arc::clone(&self.concurrency)
            .acquire_owned()
            .await
            .expect("gate semaphore is never closed");

        loop {
            let now_ms = common::time::now_ms();
            match self.try_take(now_ms) {
                Ok(()) => return GatePermit { _permit: permit },
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    pub fn available_concurrency(&self) -> usize {
        self.concurrency.available_permits()
    }
}
