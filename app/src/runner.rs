//! Tick drivers.
//!
//! The detection ticker fires every `detection_interval_secs`, the
//! maintenance ticker hourly. Missed ticks are skipped, never back-filled;
//! an overlapping tick is suppressed with a try-lock guard; a failing tick
//! logs and leaves the schedule running.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, error, info, warn};

use analytics::AuditLedger;
use common::logging::{TraceId, root_span};
use common::time::now_ms;
use detector::DetectorConfig;
use distributor::DistributionEngine;
use exchange::registry::VenueRegistry;
use profile::ProfileManager;
use profile::repository::ProfileRepository;
use store::SqlKv;

pub struct Runner<R: ProfileRepository> {
    pub registry: Arc<VenueRegistry>,
    pub detector_cfg: DetectorConfig,
    pub engine: Arc<DistributionEngine<R>>,
    pub profiles: Arc<ProfileManager<R>>,
    pub audit: AuditLedger,
    pub sql_kv: Arc<SqlKv>,
}

impl<R: ProfileRepository + 'static> Runner<R> {
    /// One detection tick: run the cycle, feed candidates to the engine,
    /// then distribute whatever queued.
    async fn detection_tick(&self) -> anyhow::Result<()> {
        let started_ms = now_ms();
        let (tx, mut rx) = tokio::sync::mpsc::channel(256);

        let registry = Arc::clone(&self.registry);
        let cfg = self.detector_cfg.clone();
        let producer =
            tokio::spawn(async move { detector::run_cycle(registry, &cfg, &tx, started_ms).await });

        let mut accepted = 0usize;
        while let Some(candidate) = rx.recv().await {
            // A failed mirror write drops the candidate, not the tick.
            match self.engine.on_candidate(candidate, started_ms).await {
                Ok(()) => accepted += 1,
                Err(e) => warn!(error = %e, "candidate rejected: durable mirror write failed"),
            }
        }

        let emitted = producer.await??;
        let delivered = self.engine.distribute_pending(now_ms()).await;

        info!(emitted, accepted, delivered, "detection tick finished");
        Ok(())
    }

    /// Hourly housekeeping: session expiry, queue purge, kv expiry,
    /// retention.
    async fn maintenance_tick(&self) -> anyhow::Result<()> {
        let now = now_ms();

        let expired_sessions = self.profiles.expire_idle_sessions(now).await;
        let purged_opportunities = self.engine.purge_expired(now).await;
        let purged_kv = self.sql_kv.purge_expired(now).await?;
        let retention_removed = self.audit.apply_retention(now).await?;

        info!(
            expired_sessions,
            purged_opportunities,
            purged_kv,
            retention_removed,
            "maintenance tick finished"
        );
        Ok(())
    }

    /// Spawn both tickers; returns immediately.
    pub fn start(self: Arc<Self>) {
        let detection_period = Duration::from_secs(self.detector_cfg.interval_secs);

        // Each loop awaits its tick before asking the interval again, and
        // Skip drops the ticks that elapsed meanwhile: an overrunning tick
        // suppresses the next one instead of stacking.
        {
            let runner = Arc::clone(&self);

            tokio::spawn(async move {
                let mut ticker = interval(detection_period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;

                    let span = root_span("detection_tick", &TraceId::default());
                    if let Err(e) = runner.detection_tick().instrument(span).await {
                        error!(error = %e, "detection tick failed");
                    }
                }
            });
        }

        {
            let runner = Arc::clone(&self);

            tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(60 * 60));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;

                    let span = root_span("maintenance_tick", &TraceId::default());
                    if let Err(e) = runner.maintenance_tick().instrument(span).await {
                        error!(error = %e, "maintenance tick failed");
                    }
                }
            });
        }

        info!(
            detection_period_secs = detection_period.as_secs(),
            "tickers started"
        );
    }
}
