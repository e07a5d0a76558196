use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use access::resolver::FeatureFlags;
use analytics::AuditLedger;
use app::config::AppConfig;
use app::runner::Runner;
use common::logging::init_tracing;
use distributor::{DistributionEngine, FairnessConfig, OpportunityQueue, QuotaLedger};
use exchange::binance::BinanceVenue;
use exchange::bybit::BybitVenue;
use exchange::credentials::ReadOnlyCredentials;
use exchange::okx::OkxVenue;
use exchange::registry::VenueRegistry;
use exchange::types::VenueId;
use notifier::{ChannelTarget, ChatEgress, NotificationRouter, NotifyError, RenderedMessage};
use profile::vault::CredentialVault;
use profile::{ProfileManager, SqlxProfileRepository};
use store::{Db, KvStore, SqlKv};

/// Stand-in chat egress until the presentation layer is wired up.
/// Messages are logged, never sent anywhere.
struct LogEgress;

#[async_trait]
impl ChatEgress for LogEgress {
    async fn send(
        &self,
        target: &ChannelTarget,
        message: &RenderedMessage,
    ) -> Result<(), NotifyError> {
        info!(target = %target.as_record_str(), len = message.text.len(), "chat egress (log only)");
        Ok(())
    }
}

fn read_only_credentials(venue: VenueId) -> ReadOnlyCredentials {
    // Read-only platform keys; empty values keep public endpoints working
    // in development.
    let prefix = venue.as_str().to_uppercase();
    ReadOnlyCredentials::new(
        std::env::var(format!("{prefix}_API_KEY")).unwrap_or_default(),
        std::env::var(format!("{prefix}_API_SECRET")).unwrap_or_default(),
    )
}

fn build_registry(cfg: &AppConfig) -> anyhow::Result<Arc<VenueRegistry>> {
    let mut registry = VenueRegistry::new();

    for venue in &cfg.monitored_venues {
        match venue {
            VenueId::Binance => registry.register(Arc::new(BinanceVenue::new(
                exchange::binance::DEFAULT_BASE_URL,
                read_only_credentials(*venue),
            )?)),
            VenueId::Bybit => registry.register(Arc::new(BybitVenue::new(
                exchange::bybit::DEFAULT_BASE_URL,
                read_only_credentials(*venue),
            )?)),
            VenueId::Okx => registry.register(Arc::new(OkxVenue::new(
                exchange::okx::DEFAULT_BASE_URL,
                read_only_credentials(*venue),
            )?)),
        }
    }

    Ok(Arc::new(registry))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();

    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point; tokio workers start below.
        unsafe { std::env::set_var("RUST_LOG", &cfg.log_level) };
    }
    init_tracing(cfg.log_json);

    info!(
        venues = cfg.monitored_venues.len(),
        pairs = cfg.monitored_pairs.len(),
        threshold = %cfg.threshold,
        interval_secs = cfg.detection_interval_secs,
        "starting funding-rate arbitrage engine"
    );

    let detector_cfg = cfg.detector_config();
    detector_cfg.validate()?;

    // Storage
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;
    let sql_kv = Arc::new(SqlKv::new(db.pool.clone()));
    let kv: Arc<dyn KvStore> = sql_kv.clone();

    // Profiles & credentials
    let repo = Arc::new(SqlxProfileRepository::new(db.pool.clone()));
    let vault = CredentialVault::new(&cfg.encryption_key_ref);
    let profiles = Arc::new(ProfileManager::new(repo, vault, Arc::clone(&kv)).await?);

    // Venues
    let registry = build_registry(&cfg)?;

    // Distribution
    let audit = AuditLedger::new(db.pool.clone());
    let queue = Arc::new(OpportunityQueue::new(db.pool.clone(), Arc::clone(&kv)));
    let router = Arc::new(NotificationRouter::new(LogEgress));
    let fairness: FairnessConfig = cfg.fairness.clone();

    let engine = Arc::new(DistributionEngine::new(
        Arc::clone(&profiles),
        Arc::clone(&queue),
        QuotaLedger::new(db.pool.clone()),
        audit.clone(),
        router as Arc<dyn notifier::Notifier>,
        fairness,
        FeatureFlags::default(),
    ));

    // Startup recovery: reload still-live opportunities, drop the rest.
    let restored = queue.restore_active(common::time::now_ms()).await?;
    info!(restored, "startup recovery complete");

    // Tickers
    let runner = Arc::new(Runner {
        registry,
        detector_cfg,
        engine,
        profiles,
        audit,
        sql_kv,
    });
    runner.start();

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}
