use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{ChatSession, UserProfile};
use crate::preferences::Preferences;

/// Persistence contract for profiles, sessions and sealed credentials.
/// Responsible only for storage; lifecycle rules live in `ProfileManager`.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_chat_id(&self, external_chat_id: i64) -> Result<Option<UserProfile>>;

    async fn find_by_id(&self, user_id: &Uuid) -> Result<Option<UserProfile>>;

    async fn insert_profile(&self, profile: &UserProfile) -> Result<()>;

    async fn update_preferences(
        &self,
        user_id: &Uuid,
        preferences: &Preferences,
        now_ms: u64,
    ) -> Result<()>;

    async fn set_tier(&self, user_id: &Uuid, tier: crate::model::Tier, now_ms: u64) -> Result<()>;

    async fn set_beta_expiry(&self, user_id: &Uuid, beta_expires_at_ms: u64, now_ms: u64)
    -> Result<()>;

    async fn archive(&self, user_id: &Uuid, now_ms: u64) -> Result<()>;

    // Sessions

    async fn save_session(&self, session: &ChatSession) -> Result<()>;

    async fn active_sessions_for_user(&self, user_id: &Uuid) -> Result<Vec<ChatSession>>;

    async fn load_all_active_sessions(&self) -> Result<Vec<ChatSession>>;

    // Credentials (ciphertext only)

    async fn store_credential(
        &self,
        user_id: &Uuid,
        venue_id: &str,
        ciphertext: &[u8],
        now_ms: u64,
    ) -> Result<()>;

    async fn load_credential(&self, user_id: &Uuid, venue_id: &str) -> Result<Option<Vec<u8>>>;
}
