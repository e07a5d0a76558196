//! Application-wide error taxonomy.
//!
//! The set of kinds is closed: collaborators on the HTTP and chat side map
//! every failure to exactly one of these, and status-code mapping lives here
//! so no other crate re-invents it.

use serde_json::Value;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation: {message}")]
    Validation { message: String, detail: Option<Value> },

    #[error("authentication: {message}")]
    Authentication { message: String },

    #[error("authorization: {message}")]
    Authorization { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("transient network failure: {message}")]
    NetworkTransient {
        message: String,
        cause: Option<anyhow::Error>,
    },

    #[error("exchange failure: {message}")]
    Exchange {
        message: String,
        cause: Option<anyhow::Error>,
    },

    #[error("internal: {message}")]
    Internal {
        message: String,
        cause: Option<anyhow::Error>,
    },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            detail: None,
        }
    }

    pub fn validation_with_detail(message: impl Into<String>, detail: Value) -> Self {
        Self::Validation {
            message: message.into(),
            detail: Some(detail),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn network_transient(message: impl Into<String>) -> Self {
        Self::NetworkTransient {
            message: message.into(),
            cause: None,
        }
    }

    pub fn exchange(message: impl Into<String>) -> Self {
        Self::Exchange {
            message: message.into(),
            cause: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            cause: None,
        }
    }

    pub fn internal_with_cause(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Internal {
            message: message.into(),
            cause: Some(cause),
        }
    }

    /// Stable machine-readable kind, used in audit rows and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "Validation",
            CoreError::Authentication { .. } => "Authentication",
            CoreError::Authorization { .. } => "Authorization",
            CoreError::NotFound { .. } => "NotFound",
            CoreError::Conflict { .. } => "Conflict",
            CoreError::RateLimited { .. } => "RateLimited",
            CoreError::Timeout { .. } => "Timeout",
            CoreError::NetworkTransient { .. } => "NetworkTransient",
            CoreError::Exchange { .. } => "ExchangeError",
            CoreError::Internal { .. } => "Internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation { .. } => 400,
            CoreError::Authentication { .. } => 401,
            CoreError::Authorization { .. } => 403,
            CoreError::NotFound { .. } => 404,
            CoreError::Conflict { .. } => 409,
            CoreError::RateLimited { .. } => 429,
            CoreError::Timeout { .. } => 408,
            CoreError::NetworkTransient { .. } => 503,
            CoreError::Exchange { .. } => 502,
            CoreError::Internal { .. } => 500,
        }
    }

    /// Recoverable failures are skipped-and-logged by callers; terminal ones
    /// abort the enclosing operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::RateLimited { .. }
                | CoreError::Timeout { .. }
                | CoreError::NetworkTransient { .. }
                | CoreError::Exchange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_total() {
        let all = [
            CoreError::validation("v"),
            CoreError::authentication("a"),
            CoreError::authorization("z"),
            CoreError::not_found("n"),
            CoreError::conflict("c"),
            CoreError::RateLimited {
                retry_after_seconds: 1,
            },
            CoreError::timeout("t"),
            CoreError::network_transient("nt"),
            CoreError::exchange("e"),
            CoreError::internal("i"),
        ];

        for e in all {
            let status = e.http_status();
            assert!((400..=599).contains(&status), "{} -> {}", e.code(), status);
            assert!(!e.code().is_empty());
        }
    }

    #[test]
    fn recoverability_split() {
        assert!(CoreError::network_transient("x").is_recoverable());
        assert!(CoreError::exchange("x").is_recoverable());
        assert!(!CoreError::validation("x").is_recoverable());
        assert!(!CoreError::internal("x").is_recoverable());
    }
}
