//! Collaborator-facing ports.
//!
//! The HTTP and chat presentation layers live outside the core; these
//! handlers take their already-parsed requests, apply rate limiting and
//! access control, and answer with transport-neutral responses. Raw errors
//! never cross this boundary: HTTP gets the structured error body, chat
//! gets a generic failure line, and the ledger keeps the diagnosis.

use std::sync::Arc;

use tracing::{instrument, warn};
use uuid::Uuid;

use access::resolver::FeatureFlags;
use access::{Decision, Permission, check, check_degraded};
use analytics::AuditLedger;
use common::CoreError;
use profile::ProfileManager;
use profile::repository::ProfileRepository;
use ratelimit::{RouteTable, Scope};

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub client_ip: String,
    /// Verified user identity, when the auth layer resolved one.
    pub user_id: Option<Uuid>,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl HttpResponse {
    fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    fn from_error(e: &CoreError, now_ms: u64) -> Self {
        let mut headers = Vec::new();
        if let CoreError::RateLimited {
            retry_after_seconds,
        } = e
        {
            headers.push(("Retry-After".to_string(), retry_after_seconds.to_string()));
        }

        Self {
            status: e.http_status(),
            headers,
            body: serde_json::json!({
                "error": e.code(),
                "message": e.to_string(),
                "errorId": Uuid::new_v4().to_string(),
                "timestamp": now_ms,
            }),
        }
    }
}

pub struct HttpIngress<R: ProfileRepository> {
    pub routes: RouteTable,
    pub profiles: Arc<ProfileManager<R>>,
    pub audit: AuditLedger,
    pub flags: FeatureFlags,
}

impl<R: ProfileRepository> HttpIngress<R> {
    /// Rate-limit then authorize. Handlers behind this port only run for
    /// requests that cleared both gates.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn admit(&self, request: &HttpRequest, now_ms: u64) -> HttpResponse {
        let scope = Scope::from_request(request.user_id, &request.client_ip);

        let decision = self
            .routes
            .check(&request.method, &request.path, &scope, now_ms)
            .await;

        if let Some(retry_after_seconds) = decision.retry_after_seconds() {
            self.audit
                .record_rate_limit_denied(
                    request.user_id.as_ref(),
                    &format!("{} {}", request.method, request.path),
                    now_ms,
                )
                .await;
            return HttpResponse::from_error(
                &CoreError::RateLimited {
                    retry_after_seconds,
                },
                now_ms,
            );
        }

        if let Err(e) = self.authorize(request, now_ms).await {
            return HttpResponse::from_error(&e, now_ms);
        }

        HttpResponse::ok(serde_json::json!({ "admitted": true }))
    }

    async fn authorize(&self, request: &HttpRequest, now_ms: u64) -> Result<(), CoreError> {
        let required = if request.path.starts_with("/admin/") {
            Permission::SystemAdministration
        } else {
            Permission::BasicOpportunities
        };

        let Some(user_id) = request.user_id else {
            if required == Permission::SystemAdministration {
                return Err(CoreError::authentication("admin routes require identity"));
            }
            return Ok(());
        };

        match self.profiles.find_by_id(&user_id).await {
            Ok(Some(profile)) => match check(&profile, required, now_ms, &self.flags) {
                Decision::Allow => Ok(()),
                Decision::Deny(reason) => Err(CoreError::authorization(format!(
                    "permission {required} denied: {reason:?}"
                ))),
            },
            Ok(None) => Err(CoreError::not_found("unknown user")),
            Err(e) => {
                // Degraded mode: basic surface only, admin fails closed.
                warn!(error = %e, "profile store unavailable; degraded access mode");
                match check_degraded(required, false) {
                    Decision::Allow => Ok(()),
                    Decision::Deny(reason) => Err(CoreError::authorization(format!(
                        "degraded mode denied {required}: {reason:?}"
                    ))),
                }
            }
        }
    }
}

/// What the chat presentation layer hands the core per inbound message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub external_chat_id: i64,
    /// True for commands that passed the bot's auth handshake; only these
    /// extend a session.
    pub authenticated_command: bool,
}

pub struct ChatIngress<R: ProfileRepository> {
    pub profiles: Arc<ProfileManager<R>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    None,
    /// Localised generic failure; diagnosis lives in the ledger, never in
    /// chat.
    Failure(notifier::RenderedMessage),
}

impl<R: ProfileRepository> ChatIngress<R> {
    /// First-contact provisioning plus session upkeep. Never surfaces raw
    /// errors into chat.
    pub async fn on_message(&self, message: &ChatMessage, now_ms: u64) -> ChatReply {
        match self
            .profiles
            .on_first_contact(message.external_chat_id, now_ms)
            .await
        {
            Ok(_) => {
                if message.authenticated_command {
                    let _ = self
                        .profiles
                        .touch_session(message.external_chat_id, now_ms)
                        .await;
                }
                ChatReply::None
            }
            Err(e) => {
                warn!(chat_id = message.external_chat_id, error = %e, "chat ingress failure");
                ChatReply::Failure(notifier::render::render_delivery_failure())
            }
        }
    }
}
