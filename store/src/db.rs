//! Relational pool and schema.
//!
//! One `AnyPool` serves sqlite (dev, tests) and postgres (production); the
//! DDL sticks to the portable subset. Migration is idempotent and runs at
//! every startup.

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

use crate::sql_kv::SqlKv;

#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        migrate(&self.pool).await
    }
}

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Profiles
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS users (
  user_id TEXT PRIMARY KEY,
  external_chat_id BIGINT NOT NULL,
  tier TEXT NOT NULL,
  role TEXT NOT NULL,
  preferences_json TEXT NOT NULL,
  beta_expires_at_ms BIGINT NOT NULL,
  archived INTEGER NOT NULL DEFAULT 0,
  created_at_ms BIGINT NOT NULL,
  updated_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Encrypted venue API keys; hex-encoded ciphertext only, never plaintext.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS user_credentials (
  user_id TEXT NOT NULL,
  venue_id TEXT NOT NULL,
  ciphertext TEXT NOT NULL,
  updated_at_ms BIGINT NOT NULL,
  PRIMARY KEY (user_id, venue_id)
);
"#,
    )
    .execute(pool)
    .await?;

    // Chat sessions
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS chat_sessions (
  session_id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  external_chat_id BIGINT NOT NULL,
  state TEXT NOT NULL,
  started_at_ms BIGINT NOT NULL,
  last_activity_at_ms BIGINT NOT NULL,
  expires_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Durable mirror of detected opportunities
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS opportunities (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  long_venue TEXT NOT NULL,
  short_venue TEXT NOT NULL,
  long_rate_bps BIGINT NOT NULL,
  short_rate_bps BIGINT NOT NULL,
  total_fee_bps BIGINT NOT NULL,
  net_diff_bps BIGINT NOT NULL,
  priority_score DOUBLE PRECISION NOT NULL,
  detected_at_ms BIGINT NOT NULL,
  expires_at_ms BIGINT NOT NULL,
  max_recipients INTEGER NOT NULL,
  current_recipients INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Per (user, utc date, context) delivery quota ledger.
    // `date` is always YYYY-MM-DD; writers go through common::time::utc_date.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS user_opportunity_limits (
  user_id TEXT NOT NULL,
  date TEXT NOT NULL,
  context_id TEXT NOT NULL,
  received_arb INTEGER NOT NULL,
  received_tech INTEGER NOT NULL,
  arb_limit INTEGER NOT NULL,
  tech_limit INTEGER NOT NULL,
  is_group_context INTEGER NOT NULL,
  group_multiplier_applied INTEGER NOT NULL,
  last_delivery_ms BIGINT NOT NULL,
  last_reset_unix BIGINT NOT NULL,
  PRIMARY KEY (user_id, date, context_id)
);
"#,
    )
    .execute(pool)
    .await?;

    // Append-only delivery audit; primary key doubles as the idempotency key.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS distribution_records (
  opportunity_id TEXT NOT NULL,
  user_id TEXT NOT NULL,
  distributed_at_ms BIGINT NOT NULL,
  channel TEXT NOT NULL,
  user_response TEXT NOT NULL,
  PRIMARY KEY (opportunity_id, user_id)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS audit_log (
  id TEXT PRIMARY KEY,
  user_id TEXT,
  action TEXT NOT NULL,
  resource_type TEXT NOT NULL,
  resource_id TEXT NOT NULL,
  new_value_json TEXT,
  unix_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_users_chat ON users(external_chat_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_opportunities_expiry ON opportunities(expires_at_ms);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_audit_action_time ON audit_log(action, unix_ms);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_distribution_time ON distribution_records(distributed_at_ms);"#,
    )
    .execute(pool)
    .await?;

    SqlKv::migrate(pool).await?;

    Ok(())
}
