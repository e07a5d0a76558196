use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use profile::model::{ChatSession, SessionState, Tier, UserProfile};
use profile::preferences::Preferences;
use profile::repository::ProfileRepository;

/// In-memory repository double shared by the manager tests.
#[derive(Default, Clone)]
pub struct MockRepo {
    pub profiles: Arc<Mutex<HashMap<Uuid, UserProfile>>>,
    pub sessions: Arc<Mutex<HashMap<Uuid, ChatSession>>>,
    pub credentials: Arc<Mutex<HashMap<(Uuid, String), Vec<u8>>>>,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for MockRepo {
    async fn find_by_chat_id(&self, external_chat_id: i64) -> anyhow::Result<Option<UserProfile>> {
        Ok(self
            .profiles
            .lock()
            .await
            .values()
            .find(|p| p.external_chat_id == external_chat_id && !p.archived)
            .cloned())
    }

    async fn find_by_id(&self, user_id: &Uuid) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.profiles.lock().await.get(user_id).cloned())
    }

    async fn insert_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.profiles
            .lock()
            .await
            .insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn update_preferences(
        &self,
        user_id: &Uuid,
        preferences: &Preferences,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let mut g = self.profiles.lock().await;
        let p = g
            .get_mut(user_id)
            .ok_or_else(|| anyhow::anyhow!("user not found"))?;
        p.preferences = preferences.clone();
        p.updated_at_ms = now_ms;
        Ok(())
    }

    async fn set_tier(&self, user_id: &Uuid, tier: Tier, now_ms: u64) -> anyhow::Result<()> {
        let mut g = self.profiles.lock().await;
        let p = g
            .get_mut(user_id)
            .ok_or_else(|| anyhow::anyhow!("user not found"))?;
        p.tier = tier;
        p.updated_at_ms = now_ms;
        Ok(())
    }

    async fn set_beta_expiry(
        &self,
        user_id: &Uuid,
        beta_expires_at_ms: u64,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let mut g = self.profiles.lock().await;
        let p = g
            .get_mut(user_id)
            .ok_or_else(|| anyhow::anyhow!("user not found"))?;
        p.beta_expires_at_ms = beta_expires_at_ms;
        p.updated_at_ms = now_ms;
        Ok(())
    }

    async fn archive(&self, user_id: &Uuid, now_ms: u64) -> anyhow::Result<()> {
        let mut g = self.profiles.lock().await;
        if let Some(p) = g.get_mut(user_id) {
            p.archived = true;
            p.updated_at_ms = now_ms;
        }
        Ok(())
    }

    async fn save_session(&self, session: &ChatSession) -> anyhow::Result<()> {
        self.sessions
            .lock()
            .await
            .insert(session.session_id, session.clone());
        Ok(())
    }

    async fn active_sessions_for_user(&self, user_id: &Uuid) -> anyhow::Result<Vec<ChatSession>> {
        Ok(self
            .sessions
            .lock()
            .await
            .values()
            .filter(|s| s.user_id == *user_id && s.state == SessionState::Active)
            .cloned()
            .collect())
    }

    async fn load_all_active_sessions(&self) -> anyhow::Result<Vec<ChatSession>> {
        Ok(self
            .sessions
            .lock()
            .await
            .values()
            .filter(|s| s.state == SessionState::Active)
            .cloned()
            .collect())
    }

    async fn store_credential(
        &self,
        user_id: &Uuid,
        venue_id: &str,
        ciphertext: &[u8],
        _now_ms: u64,
    ) -> anyhow::Result<()> {
        self.credentials
            .lock()
            .await
            .insert((*user_id, venue_id.to_string()), ciphertext.to_vec());
        Ok(())
    }

    async fn load_credential(
        &self,
        user_id: &Uuid,
        venue_id: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .credentials
            .lock()
            .await
            .get(&(*user_id, venue_id.to_string()))
            .cloned())
    }
}
