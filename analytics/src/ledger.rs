use anyhow::Result;
use sqlx::{AnyPool, Row};
use tracing::warn;
use uuid::Uuid;

pub const DETECTION_RETENTION_MS: u64 = 30 * 24 * 60 * 60 * 1000;
pub const DISTRIBUTION_RETENTION_MS: u64 = 90 * 24 * 60 * 60 * 1000;

/// How far back an execution counts as "recent" for the activity boost.
pub const ACTIVITY_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    OpportunityDetected,
    DistributionDelivered,
    DistributionDenied,
    ExecutionRecorded,
    RateLimitDenied,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::OpportunityDetected => "opportunity_detected",
            AuditAction::DistributionDelivered => "distribution_delivered",
            AuditAction::DistributionDenied => "distribution_denied",
            AuditAction::ExecutionRecorded => "execution_recorded",
            AuditAction::RateLimitDenied => "rate_limit_denied",
        }
    }
}

#[derive(Clone)]
pub struct AuditLedger {
    pool: AnyPool,
}

impl AuditLedger {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    async fn append(
        &self,
        user_id: Option<&Uuid>,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        new_value: Option<serde_json::Value>,
        now_ms: u64,
    ) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO audit_log (id, user_id, action, resource_type, resource_id, new_value_json, unix_ms)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.map(|u| u.to_string()))
        .bind(action.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .bind(new_value.map(|v| v.to_string()))
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Best-effort append: audit failures are logged, never propagated into
    /// the hot path.
    async fn append_soft(
        &self,
        user_id: Option<&Uuid>,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        new_value: Option<serde_json::Value>,
        now_ms: u64,
    ) {
        if let Err(e) = self
            .append(user_id, action, resource_type, resource_id, new_value, now_ms)
            .await
        {
            warn!(action = action.as_str(), error = %e, "audit append failed");
        }
    }

    pub async fn record_detection(
        &self,
        opportunity_id: &Uuid,
        detail: serde_json::Value,
        now_ms: u64,
    ) {
        self.append_soft(
            None,
            AuditAction::OpportunityDetected,
            "opportunity",
            &opportunity_id.to_string(),
            Some(detail),
            now_ms,
        )
        .await;
    }

    pub async fn record_distribution_delivered(
        &self,
        opportunity_id: &Uuid,
        user_id: &Uuid,
        channel: &str,
        now_ms: u64,
    ) {
        self.append_soft(
            Some(user_id),
            AuditAction::DistributionDelivered,
            "opportunity",
            &opportunity_id.to_string(),
            Some(serde_json::json!({ "channel": channel })),
            now_ms,
        )
        .await;
    }

    pub async fn record_distribution_denied(
        &self,
        opportunity_id: &Uuid,
        user_id: &Uuid,
        reason: &str,
        now_ms: u64,
    ) {
        self.append_soft(
            Some(user_id),
            AuditAction::DistributionDenied,
            "opportunity",
            &opportunity_id.to_string(),
            Some(serde_json::json!({ "reason": reason })),
            now_ms,
        )
        .await;
    }

    pub async fn record_execution(
        &self,
        user_id: &Uuid,
        opportunity_id: &Uuid,
        detail: serde_json::Value,
        now_ms: u64,
    ) -> Result<()> {
        self.append(
            Some(user_id),
            AuditAction::ExecutionRecorded,
            "opportunity",
            &opportunity_id.to_string(),
            Some(detail),
            now_ms,
        )
        .await
    }

    pub async fn record_rate_limit_denied(
        &self,
        user_id: Option<&Uuid>,
        scope: &str,
        now_ms: u64,
    ) {
        self.append_soft(
            user_id,
            AuditAction::RateLimitDenied,
            "rate_limit",
            scope,
            None,
            now_ms,
        )
        .await;
    }

    /// Users with an execution inside the activity window; feeds the
    /// distribution engine's activity boost.
    pub async fn recent_executors(&self, now_ms: u64) -> Result<Vec<Uuid>> {
        let since = now_ms.saturating_sub(ACTIVITY_WINDOW_MS);

        let rows = sqlx::query(
            r#"
SELECT DISTINCT user_id FROM audit_log
WHERE action = 'execution_recorded' AND unix_ms > ? AND user_id IS NOT NULL
"#,
        )
        .bind(since as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let raw: Option<String> = r.get("user_id");
            if let Some(raw) = raw {
                match Uuid::parse_str(&raw) {
                    Ok(id) => out.push(id),
                    Err(e) => warn!(error = %e, "malformed user id in audit row"),
                }
            }
        }
        Ok(out)
    }

    /// Age-based retention. Executions are exempt.
    pub async fn apply_retention(&self, now_ms: u64) -> Result<u64> {
        let mut removed = 0;

        let res = sqlx::query("DELETE FROM audit_log WHERE action = ? AND unix_ms < ?")
            .bind(AuditAction::OpportunityDetected.as_str())
            .bind(now_ms.saturating_sub(DETECTION_RETENTION_MS) as i64)
            .execute(&self.pool)
            .await?;
        removed += res.rows_affected();

        for action in [
            AuditAction::DistributionDelivered,
            AuditAction::DistributionDenied,
        ] {
            let res = sqlx::query("DELETE FROM audit_log WHERE action = ? AND unix_ms < ?")
                .bind(action.as_str())
                .bind(now_ms.saturating_sub(DISTRIBUTION_RETENTION_MS) as i64)
                .execute(&self.pool)
                .await?;
            removed += res.rows_affected();
        }

        // Old distribution records age out on the same schedule.
        let res = sqlx::query("DELETE FROM distribution_records WHERE distributed_at_ms < ?")
            .bind(now_ms.saturating_sub(DISTRIBUTION_RETENTION_MS) as i64)
            .execute(&self.pool)
            .await?;
        removed += res.rows_affected();

        Ok(removed)
    }
}
