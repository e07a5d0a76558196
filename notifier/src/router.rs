//! Delivery with bounded retries.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::policy::{RoutePolicy, route_policy};
use crate::types::{ChannelTarget, NotifyError, PayloadKind, RenderedMessage};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Outbound chat port. The presentation layer supplies the implementation;
/// the core only ever sees this seam.
#[async_trait]
pub trait ChatEgress: Send + Sync {
    async fn send(&self, target: &ChannelTarget, message: &RenderedMessage)
    -> Result<(), NotifyError>;
}

/// Routing facade the distribution engine talks to.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        target: &ChannelTarget,
        kind: PayloadKind,
        message: &RenderedMessage,
    ) -> Result<(), NotifyError>;
}

pub struct NotificationRouter<E: ChatEgress> {
    egress: E,
}

impl<E: ChatEgress> NotificationRouter<E> {
    pub fn new(egress: E) -> Self {
        Self { egress }
    }
}

#[async_trait]
impl<E: ChatEgress> Notifier for NotificationRouter<E> {
    /// Policy-gate the payload, then deliver with up to three attempts and
    /// exponential backoff on transient failures. Terminal failures bubble
    /// to the caller, which records them in the analytics ledger.
    #[instrument(skip(self, message), fields(kind = kind.as_str()))]
    async fn notify(
        &self,
        target: &ChannelTarget,
        kind: PayloadKind,
        message: &RenderedMessage,
    ) -> Result<(), NotifyError> {
        if route_policy(kind, target) == RoutePolicy::Reject {
            return Err(NotifyError::PolicyViolation {
                kind: kind.as_str(),
            });
        }

        let mut delay = INITIAL_BACKOFF;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.egress.send(target, message).await {
                Ok(()) => {
                    debug!(attempt, "notification delivered");
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %e, "transient delivery failure; backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("loop returns on the final attempt")
    }
}
