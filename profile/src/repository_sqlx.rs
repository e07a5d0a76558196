//! SQLx-backed implementation of `ProfileRepository`.
//! Responsible only for persistence and row mapping.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::model::{ChatSession, SessionState, Tier, UserProfile};
use crate::preferences::{self, Preferences};
use crate::repository::ProfileRepository;

pub struct SqlxProfileRepository {
    pool: AnyPool,
}

impl SqlxProfileRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

fn row_to_profile(row: &sqlx::any::AnyRow) -> anyhow::Result<UserProfile> {
    let user_id_str: String = row.get("user_id");
    let tier_str: String = row.get("tier");
    let role_str: String = row.get("role");
    let preferences_json: String = row.get("preferences_json");

    Ok(UserProfile {
        user_id: Uuid::parse_str(&user_id_str)?,
        external_chat_id: row.get::<i64, _>("external_chat_id"),
        tier: Tier::from_str(&tier_str)?,
        role: crate::model::Role::from_str(&role_str)?,
        preferences: preferences::parse_and_migrate(&preferences_json)?,
        beta_expires_at_ms: row.get::<i64, _>("beta_expires_at_ms") as u64,
        archived: row.get::<i64, _>("archived") != 0,
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
    })
}

fn row_to_session(row: &sqlx::any::AnyRow) -> anyhow::Result<ChatSession> {
    let session_id_str: String = row.get("session_id");
    let user_id_str: String = row.get("user_id");
    let state_str: String = row.get("state");

    Ok(ChatSession {
        session_id: Uuid::parse_str(&session_id_str)?,
        user_id: Uuid::parse_str(&user_id_str)?,
        external_chat_id: row.get::<i64, _>("external_chat_id"),
        state: SessionState::from_str(&state_str)?,
        started_at_ms: row.get::<i64, _>("started_at_ms") as u64,
        last_activity_at_ms: row.get::<i64, _>("last_activity_at_ms") as u64,
        expires_at_ms: row.get::<i64, _>("expires_at_ms") as u64,
    })
}

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn find_by_chat_id(&self, external_chat_id: i64) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
SELECT user_id, external_chat_id, tier, role, preferences_json,
       beta_expires_at_ms, archived, created_at_ms, updated_at_ms
FROM users
WHERE external_chat_id = ? AND archived = 0
"#,
        )
        .bind(external_chat_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_profile(&r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, user_id: &Uuid) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
SELECT user_id, external_chat_id, tier, role, preferences_json,
       beta_expires_at_ms, archived, created_at_ms, updated_at_ms
FROM users
WHERE user_id = ?
"#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_profile(&r)?)),
            None => Ok(None),
        }
    }

    async fn insert_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        let preferences_json = preferences::to_stored_json(&profile.preferences)?;

        sqlx::query(
            r#"
INSERT INTO users (user_id, external_chat_id, tier, role, preferences_json,
                   beta_expires_at_ms, archived, created_at_ms, updated_at_ms)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(profile.user_id.to_string())
        .bind(profile.external_chat_id)
        .bind(profile.tier.as_str())
        .bind(profile.role.as_str())
        .bind(preferences_json)
        .bind(profile.beta_expires_at_ms as i64)
        .bind(profile.archived as i64)
        .bind(profile.created_at_ms as i64)
        .bind(profile.updated_at_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_preferences(
        &self,
        user_id: &Uuid,
        prefs: &Preferences,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let preferences_json = preferences::to_stored_json(prefs)?;

        let res = sqlx::query(
            "UPDATE users SET preferences_json = ?, updated_at_ms = ? WHERE user_id = ?",
        )
        .bind(preferences_json)
        .bind(now_ms as i64)
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() != 1 {
            return Err(anyhow!("user {user_id} not found"));
        }
        Ok(())
    }

    async fn set_tier(&self, user_id: &Uuid, tier: Tier, now_ms: u64) -> anyhow::Result<()> {
        let res = sqlx::query("UPDATE users SET tier = ?, updated_at_ms = ? WHERE user_id = ?")
            .bind(tier.as_str())
            .bind(now_ms as i64)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if res.rows_affected() != 1 {
            return Err(anyhow!("user {user_id} not found"));
        }
        Ok(())
    }

    async fn set_beta_expiry(
        &self,
        user_id: &Uuid,
        beta_expires_at_ms: u64,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let res = sqlx::query(
            "UPDATE users SET beta_expires_at_ms = ?, updated_at_ms = ? WHERE user_id = ?",
        )
        .bind(beta_expires_at_ms as i64)
        .bind(now_ms as i64)
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() != 1 {
            return Err(anyhow!("user {user_id} not found"));
        }
        Ok(())
    }

    async fn archive(&self, user_id: &Uuid, now_ms: u64) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET archived = 1, updated_at_ms = ? WHERE user_id = ?")
            .bind(now_ms as i64)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_session(&self, session: &ChatSession) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
UPDATE chat_sessions
SET state = ?, last_activity_at_ms = ?, expires_at_ms = ?
WHERE session_id = ?
"#,
        )
        .bind(session.state.to_string())
        .bind(session.last_activity_at_ms as i64)
        .bind(session.expires_at_ms as i64)
        .bind(session.session_id.to_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
INSERT INTO chat_sessions (session_id, user_id, external_chat_id, state,
                           started_at_ms, last_activity_at_ms, expires_at_ms)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
            )
            .bind(session.session_id.to_string())
            .bind(session.user_id.to_string())
            .bind(session.external_chat_id)
            .bind(session.state.to_string())
            .bind(session.started_at_ms as i64)
            .bind(session.last_activity_at_ms as i64)
            .bind(session.expires_at_ms as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn active_sessions_for_user(&self, user_id: &Uuid) -> anyhow::Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? AND state = 'Active'",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_session(&r) {
                Ok(s) => out.push(s),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the batch
                    tracing::warn!(error = %e, "skipping malformed session row");
                }
            }
        }
        Ok(out)
    }

    async fn load_all_active_sessions(&self) -> anyhow::Result<Vec<ChatSession>> {
        let rows = sqlx::query("SELECT * FROM chat_sessions WHERE state = 'Active'")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_session(&r) {
                Ok(s) => out.push(s),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed session row");
                }
            }
        }
        Ok(out)
    }

    async fn store_credential(
        &self,
        user_id: &Uuid,
        venue_id: &str,
        ciphertext: &[u8],
        now_ms: u64,
    ) -> anyhow::Result<()> {
        // Hex keeps the column portable across the Any-driver backends.
        let encoded = hex_encode(ciphertext);

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE user_credentials SET ciphertext = ?, updated_at_ms = ? WHERE user_id = ? AND venue_id = ?",
        )
        .bind(&encoded)
        .bind(now_ms as i64)
        .bind(user_id.to_string())
        .bind(venue_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO user_credentials (user_id, venue_id, ciphertext, updated_at_ms) VALUES (?, ?, ?, ?)",
            )
            .bind(user_id.to_string())
            .bind(venue_id)
            .bind(&encoded)
            .bind(now_ms as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_credential(
        &self,
        user_id: &Uuid,
        venue_id: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let row = sqlx::query(
            "SELECT ciphertext FROM user_credentials WHERE user_id = ? AND venue_id = ?",
        )
        .bind(user_id.to_string())
        .bind(venue_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(hex_decode(&r.get::<String, _>("ciphertext"))?)),
            None => Ok(None),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn hex_decode(raw: &str) -> anyhow::Result<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return Err(anyhow!("odd-length hex ciphertext"));
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&raw[i..i + 2], 16).map_err(|e| anyhow!("bad hex: {e}")))
        .collect()
}
