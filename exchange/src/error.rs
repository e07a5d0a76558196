//! Venue failure taxonomy.
//!
//! Every adapter maps transport and exchange-level failures into this closed
//! set before anything leaves the crate. The detector relies on
//! `is_transient` to decide what is worth a retry inside a cycle; everything
//! else is a null slot for that (venue, pair).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("venue rate limit hit{}", retry_after_hint(.retry_after_seconds))]
    RateLimited { retry_after_seconds: Option<u64> },

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("operation not supported by venue: {0}")]
    NotSupported(String),

    #[error("invalid nonce or timestamp window")]
    InvalidNonce,

    #[error("invalid or unknown symbol: {0}")]
    InvalidSymbol(String),

    #[error("transient network failure: {0}")]
    NetworkTransient(String),

    #[error("network timeout")]
    NetworkTimeout,

    #[error("exchange error {code}: {message}")]
    Exchange { code: String, message: String },

    #[error("unknown venue failure: {0}")]
    Unknown(String),
}

fn retry_after_hint(v: &Option<u64>) -> String {
    match v {
        Some(s) => format!("; retry after {s}s"),
        None => String::new(),
    }
}

impl VenueError {
    /// Worth retrying within the same detection cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VenueError::NetworkTransient(_)
                | VenueError::NetworkTimeout
                | VenueError::RateLimited { .. }
        )
    }

    /// Classify an HTTP status the adapter did not otherwise recognise.
    pub fn from_status(status: u16, body_hint: &str) -> Self {
        match status {
            401 => VenueError::AuthFailed(format!("http 401: {body_hint}")),
            403 => VenueError::PermissionDenied(format!("http 403: {body_hint}")),
            404 => VenueError::InvalidSymbol(body_hint.to_string()),
            418 | 429 => VenueError::RateLimited {
                retry_after_seconds: None,
            },
            500..=599 => VenueError::NetworkTransient(format!("http {status}")),
            _ => VenueError::Unknown(format!("http {status}: {body_hint}")),
        }
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return VenueError::NetworkTimeout;
        }
        if let Some(status) = e.status() {
            return VenueError::from_status(status.as_u16(), "reqwest status error");
        }
        if e.is_connect() || e.is_request() {
            return VenueError::NetworkTransient(e.to_string());
        }
        VenueError::Unknown(e.to_string())
    }
}
