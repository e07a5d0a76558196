use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::preferences::Preferences;

pub const SESSION_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Subscription tier. Drives permission resolution and fairness multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Free,
    PremiumArb,
    PremiumTech,
    Hybrid,
    AutoArb,
    AutoTech,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::PremiumArb => "PremiumArb",
            Tier::PremiumTech => "PremiumTech",
            Tier::Hybrid => "Hybrid",
            Tier::AutoArb => "AutoArb",
            Tier::AutoTech => "AutoTech",
            Tier::Enterprise => "Enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Free" => Ok(Tier::Free),
            "PremiumArb" => Ok(Tier::PremiumArb),
            "PremiumTech" => Ok(Tier::PremiumTech),
            "Hybrid" => Ok(Tier::Hybrid),
            "AutoArb" => Ok(Tier::AutoArb),
            "AutoTech" => Ok(Tier::AutoTech),
            "Enterprise" => Ok(Tier::Enterprise),
            other => Err(anyhow::anyhow!("invalid tier value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
            Role::SuperAdmin => "SuperAdmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Role::User),
            "Admin" => Ok(Role::Admin),
            "SuperAdmin" => Ok(Role::SuperAdmin),
            other => Err(anyhow::anyhow!("invalid role value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub external_chat_id: i64,
    pub tier: Tier,
    pub role: Role,
    pub preferences: Preferences,
    /// Unix-ms beta expiry; 0 means no beta access.
    pub beta_expires_at_ms: u64,
    pub archived: bool,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl UserProfile {
    /// Fresh profile for a first-contact user: Free tier, plain role,
    /// default preferences.
    pub fn new_first_contact(external_chat_id: i64, now_ms: u64) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            external_chat_id,
            tier: Tier::Free,
            role: Role::User,
            preferences: Preferences::default(),
            beta_expires_at_ms: 0,
            archived: false,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn beta_active(&self, now_ms: u64) -> bool {
        self.beta_expires_at_ms > now_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Active => "Active",
            SessionState::Expired => "Expired",
            SessionState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

impl FromStr for SessionState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(SessionState::Active),
            "Expired" => Ok(SessionState::Expired),
            "Terminated" => Ok(SessionState::Terminated),
            other => Err(anyhow::anyhow!("invalid session state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub external_chat_id: i64,
    pub state: SessionState,
    pub started_at_ms: u64,
    pub last_activity_at_ms: u64,
    pub expires_at_ms: u64,
}

impl ChatSession {
    pub fn start(user_id: Uuid, external_chat_id: i64, now_ms: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            external_chat_id,
            state: SessionState::Active,
            started_at_ms: now_ms,
            last_activity_at_ms: now_ms,
            expires_at_ms: now_ms + SESSION_TTL_MS,
        }
    }

    pub fn is_live(&self, now_ms: u64) -> bool {
        self.state == SessionState::Active && now_ms < self.expires_at_ms
    }

    /// Slide the expiry window. Callers invoke this only for
    /// authenticated-command activity; passive reads do not extend a session.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_at_ms = now_ms;
        self.expires_at_ms = now_ms + SESSION_TTL_MS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_and_role_round_trip() {
        for t in [
            Tier::Free,
            Tier::PremiumArb,
            Tier::PremiumTech,
            Tier::Hybrid,
            Tier::AutoArb,
            Tier::AutoTech,
            Tier::Enterprise,
        ] {
            assert_eq!(t.as_str().parse::<Tier>().unwrap(), t);
        }
        for r in [Role::User, Role::Admin, Role::SuperAdmin] {
            assert_eq!(r.as_str().parse::<Role>().unwrap(), r);
        }
        assert!("Gold".parse::<Tier>().is_err());
    }

    #[test]
    fn beta_flag_is_time_gated() {
        let mut p = UserProfile::new_first_contact(42, 1_000);
        assert!(!p.beta_active(1_000));

        p.beta_expires_at_ms = 5_000;
        assert!(p.beta_active(4_999));
        assert!(!p.beta_active(5_000));
    }

    #[test]
    fn session_touch_slides_expiry() {
        let mut s = ChatSession::start(Uuid::new_v4(), 42, 0);
        assert!(s.is_live(SESSION_TTL_MS - 1));
        assert!(!s.is_live(SESSION_TTL_MS));

        s.touch(SESSION_TTL_MS - 1);
        assert!(s.is_live(2 * SESSION_TTL_MS - 2));
    }

    #[test]
    fn terminated_session_is_not_live() {
        let mut s = ChatSession::start(Uuid::new_v4(), 42, 0);
        s.state = SessionState::Terminated;
        assert!(!s.is_live(1));
    }
}
