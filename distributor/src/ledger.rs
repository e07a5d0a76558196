//! Durable per-(user, UTC date, context) quota ledger.
//!
//! All counter movement is compare-and-set: the UPDATE carries the expected
//! counter value and the cap, and a zero `rows_affected` means another
//! writer won; the caller skips that user and moves on. The
//! `distribution_records` primary key (opportunity_id, user_id) doubles as
//! the idempotency key, so a replayed delivery cannot double-count.

use anyhow::Result;
use sqlx::{AnyPool, Row};
use tracing::debug;
use uuid::Uuid;

use detector::types::OpportunityKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub user_id: Uuid,
    pub date: String,
    pub context_id: String,
    pub received_arb: u32,
    pub received_tech: u32,
    pub arb_limit: u32,
    pub tech_limit: u32,
    pub is_group_context: bool,
    pub group_multiplier_applied: bool,
    pub last_delivery_ms: u64,
}

impl LedgerRow {
    pub fn received(&self, kind: OpportunityKind) -> u32 {
        match kind {
            OpportunityKind::Technical => self.received_tech,
            OpportunityKind::Arbitrage | OpportunityKind::AiEnhanced => self.received_arb,
        }
    }

    pub fn limit(&self, kind: OpportunityKind) -> u32 {
        match kind {
            OpportunityKind::Technical => self.tech_limit,
            OpportunityKind::Arbitrage | OpportunityKind::AiEnhanced => self.arb_limit,
        }
    }
}

/// Delivery outcome as recorded in `distribution_records`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserResponse {
    Delivered,
    Dismissed,
    Executed,
    Failed,
}

impl UserResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserResponse::Delivered => "Delivered",
            UserResponse::Dismissed => "Dismissed",
            UserResponse::Executed => "Executed",
            UserResponse::Failed => "Failed",
        }
    }
}

pub struct QuotaLedger {
    pool: AnyPool,
}

impl QuotaLedger {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Fetch the row, creating it with the given limits on first touch.
    /// Creation is race-safe: a concurrent insert loses quietly and the
    /// surviving row is read back.
    pub async fn fetch_or_create(
        &self,
        user_id: &Uuid,
        date: &str,
        context_id: &str,
        arb_limit: u32,
        tech_limit: u32,
        is_group_context: bool,
        now_ms: u64,
    ) -> Result<LedgerRow> {
        if let Some(row) = self.fetch(user_id, date, context_id).await? {
            return Ok(row);
        }

        sqlx::query(
            r#"
INSERT INTO user_opportunity_limits
  (user_id, date, context_id, received_arb, received_tech,
   arb_limit, tech_limit, is_group_context, group_multiplier_applied,
   last_delivery_ms, last_reset_unix)
SELECT ?, ?, ?, 0, 0, ?, ?, ?, ?, 0, ?
WHERE NOT EXISTS (
  SELECT 1 FROM user_opportunity_limits
  WHERE user_id = ? AND date = ? AND context_id = ?
)
"#,
        )
        .bind(user_id.to_string())
        .bind(date)
        .bind(context_id)
        .bind(arb_limit as i64)
        .bind(tech_limit as i64)
        .bind(is_group_context as i64)
        // The group multiplier is folded into the limits at creation time,
        // keyed on (group, date); the flag records that it already applied.
        .bind(is_group_context as i64)
        .bind((now_ms / 1000) as i64)
        .bind(user_id.to_string())
        .bind(date)
        .bind(context_id)
        .execute(&self.pool)
        .await?;

        self.fetch(user_id, date, context_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("ledger row vanished after insert"))
    }

    pub async fn fetch(
        &self,
        user_id: &Uuid,
        date: &str,
        context_id: &str,
    ) -> Result<Option<LedgerRow>> {
        let row = sqlx::query(
            r#"
SELECT user_id, date, context_id, received_arb, received_tech,
       arb_limit, tech_limit, is_group_context, group_multiplier_applied,
       last_delivery_ms
FROM user_opportunity_limits
WHERE user_id = ? AND date = ? AND context_id = ?
"#,
        )
        .bind(user_id.to_string())
        .bind(date)
        .bind(context_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else { return Ok(None) };

        Ok(Some(LedgerRow {
            user_id: *user_id,
            date: r.get::<String, _>("date"),
            context_id: r.get::<String, _>("context_id"),
            received_arb: r.get::<i64, _>("received_arb") as u32,
            received_tech: r.get::<i64, _>("received_tech") as u32,
            arb_limit: r.get::<i64, _>("arb_limit") as u32,
            tech_limit: r.get::<i64, _>("tech_limit") as u32,
            is_group_context: r.get::<i64, _>("is_group_context") != 0,
            group_multiplier_applied: r.get::<i64, _>("group_multiplier_applied") != 0,
            last_delivery_ms: r.get::<i64, _>("last_delivery_ms") as u64,
        }))
    }

    /// CAS increment of the day's counter for `kind`. `expected_received`
    /// is the counter value the caller based its decision on; the update
    /// also re-checks the cap so the counter can never pass the limit.
    pub async fn try_record_delivery(
        &self,
        user_id: &Uuid,
        date: &str,
        context_id: &str,
        kind: OpportunityKind,
        expected_received: u32,
        now_ms: u64,
    ) -> Result<bool> {
        let column = match kind {
            OpportunityKind::Technical => "received_tech",
            OpportunityKind::Arbitrage | OpportunityKind::AiEnhanced => "received_arb",
        };
        let limit_column = match kind {
            OpportunityKind::Technical => "tech_limit",
            OpportunityKind::Arbitrage | OpportunityKind::AiEnhanced => "arb_limit",
        };

        let sql = format!(
            r#"
UPDATE user_opportunity_limits
SET {column} = {column} + 1, last_delivery_ms = ?
WHERE user_id = ? AND date = ? AND context_id = ?
  AND {column} = ?
  AND {column} < {limit_column}
"#
        );

        let res = sqlx::query(&sql)
            .bind(now_ms as i64)
            .bind(user_id.to_string())
            .bind(date)
            .bind(context_id)
            .bind(expected_received as i64)
            .execute(&self.pool)
            .await?;

        let applied = res.rows_affected() == 1;
        if !applied {
            debug!(
                user_id = %user_id,
                date,
                context_id,
                expected = expected_received,
                "ledger CAS miss; skipping user"
            );
        }
        Ok(applied)
    }

    /// Undo one CAS increment after a downstream failure in the same tick.
    pub async fn release_delivery(
        &self,
        user_id: &Uuid,
        date: &str,
        context_id: &str,
        kind: OpportunityKind,
    ) -> Result<()> {
        let column = match kind {
            OpportunityKind::Technical => "received_tech",
            OpportunityKind::Arbitrage | OpportunityKind::AiEnhanced => "received_arb",
        };

        let sql = format!(
            r#"
UPDATE user_opportunity_limits
SET {column} = {column} - 1
WHERE user_id = ? AND date = ? AND context_id = ? AND {column} > 0
"#
        );

        sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(date)
            .bind(context_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append the delivery record. Returns false if this (opportunity,
    /// user) pairing was already recorded; this is the at-most-once guard.
    pub async fn insert_distribution_record(
        &self,
        opportunity_id: &Uuid,
        user_id: &Uuid,
        channel: &str,
        response: UserResponse,
        now_ms: u64,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
INSERT INTO distribution_records
  (opportunity_id, user_id, distributed_at_ms, channel, user_response)
SELECT ?, ?, ?, ?, ?
WHERE NOT EXISTS (
  SELECT 1 FROM distribution_records WHERE opportunity_id = ? AND user_id = ?
)
"#,
        )
        .bind(opportunity_id.to_string())
        .bind(user_id.to_string())
        .bind(now_ms as i64)
        .bind(channel)
        .bind(response.as_str())
        .bind(opportunity_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    /// Update the recorded outcome (e.g. Delivered -> Executed).
    pub async fn update_user_response(
        &self,
        opportunity_id: &Uuid,
        user_id: &Uuid,
        response: UserResponse,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE distribution_records SET user_response = ? WHERE opportunity_id = ? AND user_id = ?",
        )
        .bind(response.as_str())
        .bind(opportunity_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn was_delivered(&self, opportunity_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM distribution_records WHERE opportunity_id = ? AND user_id = ?",
        )
        .bind(opportunity_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
