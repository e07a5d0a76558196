//! Opportunity queue: in-memory priority order, durable mirror underneath.
//!
//! Invariant: an opportunity enters the heap only after its mirror row and
//! `opp:active:*` kv entry are written. If the mirror write fails the
//! opportunity is dropped on the floor: never delivered,
//! never half-tracked. Recipient capacity lives on the mirror row and is
//! claimed via CAS.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use anyhow::Result;
use sqlx::{AnyPool, Row};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use detector::types::Opportunity;
use store::kv::{KvStore, PutOptions, Ttl};
use store::keys;

/// Heap entry; priority descending, then detection time, then pair id.
#[derive(Debug, Clone)]
struct Ranked {
    score_millis: i64,
    detected_at_ms: u64,
    pair_id: String,
    opportunity: Opportunity,
}

impl Ranked {
    fn new(opportunity: Opportunity) -> Self {
        Self {
            score_millis: (opportunity.priority_score * 1000.0) as i64,
            detected_at_ms: opportunity.detected_at_ms,
            pair_id: opportunity.pair.id(),
            opportunity,
        }
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher score wins, then earlier
        // detection, then lexicographic pair.
        self.score_millis
            .cmp(&other.score_millis)
            .then_with(|| other.detected_at_ms.cmp(&self.detected_at_ms))
            .then_with(|| other.pair_id.cmp(&self.pair_id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct OpportunityQueue {
    pool: AnyPool,
    kv: Arc<dyn KvStore>,
    heap: Mutex<BinaryHeap<Ranked>>,
}

impl OpportunityQueue {
    pub fn new(pool: AnyPool, kv: Arc<dyn KvStore>) -> Self {
        Self {
            pool,
            kv,
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Durably mirror the opportunity, then admit it to the queue.
    pub async fn push(&self, opportunity: Opportunity, now_ms: u64) -> Result<()> {
        self.persist_mirror(&opportunity).await?;

        let ttl_secs = opportunity.expires_at_ms.saturating_sub(now_ms).div_ceil(1000);
        let kv_res = self
            .kv
            .put(
                &keys::opportunity_active(&opportunity.id),
                &serde_json::to_string(&opportunity)?,
                PutOptions {
                    ttl: Some(Ttl::RelativeSeconds(ttl_secs.max(1))),
                    metadata: None,
                },
                now_ms,
            )
            .await;

        if let Err(e) = kv_res {
            // The mirror row is authoritative; a missing hot entry only
            // costs a cache miss.
            warn!(opportunity_id = %opportunity.id, error = %e, "active-set kv write failed");
        }

        debug!(
            opportunity_id = %opportunity.id,
            pair = %opportunity.pair,
            score = opportunity.priority_score,
            "opportunity enqueued"
        );

        self.heap.lock().await.push(Ranked::new(opportunity));
        Ok(())
    }

    async fn persist_mirror(&self, o: &Opportunity) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO opportunities
  (id, pair, long_venue, short_venue, long_rate_bps, short_rate_bps,
   total_fee_bps, net_diff_bps, priority_score, detected_at_ms,
   expires_at_ms, max_recipients, current_recipients)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
"#,
        )
        .bind(o.id.to_string())
        .bind(o.pair.id())
        .bind(o.long_venue.as_str())
        .bind(o.short_venue.as_str())
        .bind(o.long_rate.raw())
        .bind(o.short_rate.raw())
        .bind(o.total_fee.raw())
        .bind(o.net_rate_difference.raw())
        .bind(o.priority_score)
        .bind(o.detected_at_ms as i64)
        .bind(o.expires_at_ms as i64)
        .bind(o.max_recipients as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Highest-priority live opportunity, skipping and purging expired
    /// entries along the way.
    pub async fn pop_live(&self, now_ms: u64) -> Option<Opportunity> {
        let mut heap = self.heap.lock().await;

        while let Some(ranked) = heap.pop() {
            if ranked.opportunity.is_expired(now_ms) {
                self.purge_one(&ranked.opportunity.id).await;
                continue;
            }
            return Some(ranked.opportunity);
        }
        None
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.heap.lock().await.is_empty()
    }

    async fn purge_one(&self, id: &Uuid) {
        if let Err(e) = self.kv.delete(&keys::opportunity_active(id)).await {
            warn!(opportunity_id = %id, error = %e, "failed to drop expired active-set entry");
        }
    }

    /// Drop every expired entry; the mirror rows stay for the audit trail.
    /// Undelivered expiry is not a failure.
    pub async fn purge_expired(&self, now_ms: u64) -> usize {
        let mut heap = self.heap.lock().await;

        let before = heap.len();
        let (live, dead): (Vec<Ranked>, Vec<Ranked>) = heap
            .drain()
            .partition(|r| !r.opportunity.is_expired(now_ms));

        for r in &dead {
            self.purge_one(&r.opportunity.id).await;
        }

        *heap = live.into_iter().collect();
        let purged = before - heap.len();
        if purged > 0 {
            info!(purged, "expired opportunities purged from queue");
        }
        purged
    }

    /// Rebuild the heap from the `opp:active:*` entries after a restart.
    /// Expired and corrupted entries are dropped along the way.
    pub async fn restore_active(&self, now_ms: u64) -> Result<usize> {
        let mut restored = 0;
        let mut cursor = None;

        loop {
            let page = self
                .kv
                .list(
                    store::kv::ListOptions {
                        prefix: keys::OPPORTUNITY_ACTIVE_PREFIX.to_string(),
                        cursor,
                        limit: 100,
                    },
                    now_ms,
                )
                .await
                .map_err(|e| anyhow::anyhow!("active-set list failed: {e}"))?;

            for key in &page.keys {
                let Some(opportunity) =
                    store::kv::get_json::<Opportunity>(self.kv.as_ref(), key, now_ms)
                        .await
                        .map_err(|e| anyhow::anyhow!("active-set read failed: {e}"))?
                else {
                    continue;
                };

                if opportunity.is_expired(now_ms) {
                    self.purge_one(&opportunity.id).await;
                    continue;
                }

                self.heap.lock().await.push(Ranked::new(opportunity));
                restored += 1;
            }

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }

        if restored > 0 {
            info!(restored, "active opportunities restored from kv");
        }
        Ok(restored)
    }

    /// CAS claim of one recipient slot on the mirror row.
    ///
    /// `expected_current` is the value the caller observed; a stale
    /// expectation or a full opportunity both return false.
    pub async fn try_claim_recipient_slot(
        &self,
        opportunity_id: &Uuid,
        expected_current: u32,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
UPDATE opportunities
SET current_recipients = current_recipients + 1
WHERE id = ?
  AND current_recipients = ?
  AND current_recipients < max_recipients
"#,
        )
        .bind(opportunity_id.to_string())
        .bind(expected_current as i64)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    /// Release a slot claimed in this tick after a downstream failure.
    pub async fn release_recipient_slot(&self, opportunity_id: &Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE opportunities SET current_recipients = current_recipients - 1 WHERE id = ? AND current_recipients > 0",
        )
        .bind(opportunity_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn current_recipients(&self, opportunity_id: &Uuid) -> Result<Option<(u32, u32)>> {
        let row = sqlx::query(
            "SELECT current_recipients, max_recipients FROM opportunities WHERE id = ?",
        )
        .bind(opportunity_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            (
                r.get::<i64, _>("current_recipients") as u32,
                r.get::<i64, _>("max_recipients") as u32,
            )
        }))
    }
}
