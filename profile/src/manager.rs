//! Manages the in-memory live set of profiles and sessions and persists
//! changes through the repository.
//!
//! Lifecycle rules enforced here:
//!   • profile is created on first contact, never deleted (archive only)
//!   • a chat session slides only on authenticated-command activity
//!   • credential updates seal through the vault and purge the user's
//!     cached credential entries so stale adapters cannot survive

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use store::{KvStore, keys};

use crate::model::{ChatSession, SessionState, UserProfile};
use crate::preferences::Preferences;
use crate::repository::ProfileRepository;
use crate::vault::{CredentialVault, VenueCredential};

pub struct ProfileManager<R: ProfileRepository> {
    repo: Arc<R>,
    vault: CredentialVault,
    kv: Arc<dyn KvStore>,

    profiles: Mutex<HashMap<Uuid, UserProfile>>,
    by_chat: Mutex<HashMap<i64, Uuid>>,
    sessions: Mutex<HashMap<i64, ChatSession>>,
}

impl<R: ProfileRepository> ProfileManager<R> {
    pub async fn new(
        repo: Arc<R>,
        vault: CredentialVault,
        kv: Arc<dyn KvStore>,
    ) -> anyhow::Result<Self> {
        let manager = Self {
            repo,
            vault,
            kv,
            profiles: Mutex::new(HashMap::new()),
            by_chat: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        };

        manager.restore_sessions().await?;
        Ok(manager)
    }

    /// Rebuild the live session map from storage on startup.
    async fn restore_sessions(&self) -> anyhow::Result<()> {
        let all = self.repo.load_all_active_sessions().await?;
        let mut sessions = self.sessions.lock().await;
        for s in all {
            sessions.insert(s.external_chat_id, s);
        }
        Ok(())
    }

    /// Resolve the profile for a chat id, creating it on first contact.
    /// Also ensures a live session exists for the chat.
    #[instrument(skip(self), fields(chat_id = external_chat_id))]
    pub async fn on_first_contact(
        &self,
        external_chat_id: i64,
        now_ms: u64,
    ) -> anyhow::Result<UserProfile> {
        if let Some(profile) = self.find_by_chat_id(external_chat_id).await? {
            self.ensure_session(&profile, now_ms).await?;
            return Ok(profile);
        }

        let profile = UserProfile::new_first_contact(external_chat_id, now_ms);
        self.repo.insert_profile(&profile).await?;

        info!(user_id = %profile.user_id, "profile created on first contact");

        {
            let mut profiles = self.profiles.lock().await;
            profiles.insert(profile.user_id, profile.clone());
        }
        {
            let mut by_chat = self.by_chat.lock().await;
            by_chat.insert(external_chat_id, profile.user_id);
        }

        self.ensure_session(&profile, now_ms).await?;
        Ok(profile)
    }

    pub async fn find_by_chat_id(
        &self,
        external_chat_id: i64,
    ) -> anyhow::Result<Option<UserProfile>> {
        {
            let by_chat = self.by_chat.lock().await;
            if let Some(user_id) = by_chat.get(&external_chat_id) {
                let profiles = self.profiles.lock().await;
                if let Some(p) = profiles.get(user_id) {
                    return Ok(Some(p.clone()));
                }
            }
        }

        let Some(profile) = self.repo.find_by_chat_id(external_chat_id).await? else {
            return Ok(None);
        };

        let mut profiles = self.profiles.lock().await;
        let mut by_chat = self.by_chat.lock().await;
        by_chat.insert(external_chat_id, profile.user_id);
        profiles.insert(profile.user_id, profile.clone());

        Ok(Some(profile))
    }

    pub async fn find_by_id(&self, user_id: &Uuid) -> anyhow::Result<Option<UserProfile>> {
        {
            let profiles = self.profiles.lock().await;
            if let Some(p) = profiles.get(user_id) {
                return Ok(Some(p.clone()));
            }
        }

        let Some(profile) = self.repo.find_by_id(user_id).await? else {
            return Ok(None);
        };

        let mut profiles = self.profiles.lock().await;
        let mut by_chat = self.by_chat.lock().await;
        by_chat.insert(profile.external_chat_id, profile.user_id);
        profiles.insert(profile.user_id, profile.clone());

        Ok(Some(profile))
    }

    async fn ensure_session(&self, profile: &UserProfile, now_ms: u64) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;

        match sessions.get(&profile.external_chat_id) {
            Some(s) if s.is_live(now_ms) => Ok(()),
            _ => {
                let session = ChatSession::start(profile.user_id, profile.external_chat_id, now_ms);
                self.repo.save_session(&session).await?;
                sessions.insert(profile.external_chat_id, session);
                Ok(())
            }
        }
    }

    /// Record authenticated-command activity: slides the session window.
    /// Passive reads must not call this.
    pub async fn touch_session(&self, external_chat_id: i64, now_ms: u64) -> anyhow::Result<bool> {
        let mut sessions = self.sessions.lock().await;

        let Some(session) = sessions.get_mut(&external_chat_id) else {
            return Ok(false);
        };

        if !session.is_live(now_ms) {
            return Ok(false);
        }

        session.touch(now_ms);
        self.repo.save_session(session).await?;
        Ok(true)
    }

    pub async fn has_active_session(&self, user_id: &Uuid, now_ms: u64) -> bool {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .any(|s| s.user_id == *user_id && s.is_live(now_ms))
    }

    /// Explicit logout.
    pub async fn terminate_session(&self, external_chat_id: i64) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get_mut(&external_chat_id) {
            session.state = SessionState::Terminated;
            self.repo.save_session(session).await?;
            sessions.remove(&external_chat_id);
        }
        Ok(())
    }

    /// Expiry sweep, called from the maintenance tick.
    pub async fn expire_idle_sessions(&self, now_ms: u64) -> usize {
        let mut sessions = self.sessions.lock().await;

        let expired: Vec<i64> = sessions
            .iter_mut()
            .filter(|(_, s)| !s.is_live(now_ms))
            .map(|(chat_id, s)| {
                s.state = SessionState::Expired;
                *chat_id
            })
            .collect();

        for chat_id in &expired {
            if let Some(s) = sessions.get(chat_id) {
                if let Err(e) = self.repo.save_session(s).await {
                    warn!(chat_id, error = %e, "failed to persist expired session");
                }
            }
            sessions.remove(chat_id);
        }

        expired.len()
    }

    #[instrument(skip(self, prefs), fields(user_id = %user_id))]
    pub async fn update_preferences(
        &self,
        user_id: &Uuid,
        prefs: Preferences,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        self.repo.update_preferences(user_id, &prefs, now_ms).await?;

        let mut profiles = self.profiles.lock().await;
        if let Some(p) = profiles.get_mut(user_id) {
            p.preferences = prefs;
            p.updated_at_ms = now_ms;
        }
        Ok(())
    }

    pub async fn archive(&self, user_id: &Uuid, now_ms: u64) -> anyhow::Result<()> {
        self.repo.archive(user_id, now_ms).await?;

        let mut profiles = self.profiles.lock().await;
        if let Some(p) = profiles.remove(user_id) {
            let mut by_chat = self.by_chat.lock().await;
            by_chat.remove(&p.external_chat_id);
        }
        Ok(())
    }

    /// Seal and persist a venue credential, then purge the user's cached
    /// credential entry so any adapter built from the old key is dropped.
    #[instrument(skip(self, credential), fields(user_id = %user_id, venue = venue_id))]
    pub async fn store_venue_credential(
        &self,
        user_id: &Uuid,
        venue_id: &str,
        credential: VenueCredential,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let blob = self.vault.seal(&credential)?;
        self.repo
            .store_credential(user_id, venue_id, &blob, now_ms)
            .await?;

        let cache_key = keys::cred_cache(user_id, venue_id);
        if let Err(e) = self.kv.delete(&cache_key).await {
            warn!(error = %e, "credential cache purge failed; entry will age out via ttl");
        }

        info!("venue credential updated");
        Ok(())
    }

    pub async fn load_venue_credential(
        &self,
        user_id: &Uuid,
        venue_id: &str,
    ) -> anyhow::Result<Option<VenueCredential>> {
        let Some(blob) = self.repo.load_credential(user_id, venue_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.vault.unseal(&blob)?))
    }

    /// Snapshot of cached profiles; used by the distributor to build its
    /// candidate set without hitting storage per opportunity.
    pub async fn cached_profiles(&self) -> Vec<UserProfile> {
        let profiles = self.profiles.lock().await;
        profiles.values().cloned().collect()
    }
}
