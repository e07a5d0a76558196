//! Platform read-only credentials and request signing.
//!
//! The global detection path authenticates with platform-held keys that are
//! provisioned read-only at the venue. `GlobalApiConfig` re-checks that
//! invariant in-process so a misprovisioned key is caught at startup, not at
//! order time. User trading keys live in the profile vault and are never
//! visible from here.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::VenueError;
use crate::types::VenueId;

type HmacSha256 = Hmac<Sha256>;

/// API key pair. `Debug` redacts the secret so it can never leak into logs.
#[derive(Clone)]
pub struct ReadOnlyCredentials {
    pub api_key: String,
    api_secret: String,
}

impl ReadOnlyCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// HMAC-SHA256 signature over a canonical query/payload string, hex
    /// encoded; the signing scheme used by every venue here.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(payload.as_bytes());

        use fmt::Write;

        let digest = mac.finalize().into_bytes();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Debug for ReadOnlyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Per-venue configuration for global opportunity generation.
#[derive(Debug, Clone)]
pub struct GlobalApiConfig {
    pub venue: VenueId,
    pub credentials: ReadOnlyCredentials,
    trading_enabled: bool,
}

impl GlobalApiConfig {
    pub fn new_read_only(venue: VenueId, credentials: ReadOnlyCredentials) -> Self {
        Self {
            venue,
            credentials,
            trading_enabled: false,
        }
    }

    pub fn can_trade(&self) -> bool {
        self.trading_enabled
    }

    pub fn validate_read_only(&self) -> Result<(), VenueError> {
        if self.trading_enabled {
            return Err(VenueError::PermissionDenied(
                "global opportunity credentials must be read-only".to_string(),
            ));
        }
        Ok(())
    }
}
