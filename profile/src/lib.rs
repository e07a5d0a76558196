//! User lifecycle: profiles, tiers, preferences, chat sessions and encrypted
//! venue credentials.
//!
//! A profile is created on first contact and never deleted (soft-archive
//! only). Chat sessions slide on authenticated-command activity and expire
//! after 24 hours of silence. Venue API keys are sealed with AES-256-GCM
//! before they touch the database; updating a credential purges that user's
//! cached adapter state.

pub mod manager;
pub mod model;
pub mod preferences;
pub mod repository;
pub mod repository_sqlx;
pub mod vault;

pub use manager::ProfileManager;
pub use model::{ChatSession, Role, SessionState, Tier, UserProfile};
pub use preferences::{AutomationLevel, Preferences, TradingFocus};
pub use repository::ProfileRepository;
pub use repository_sqlx::SqlxProfileRepository;
pub use vault::CredentialVault;
