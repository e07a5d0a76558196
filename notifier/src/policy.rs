//! Kind/channel gate.

use crate::types::{ChannelTarget, PayloadKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// Channel and kind are compatible.
    Send,
    /// Trade-sensitive kind on a group channel: refuse. The caller decides
    /// whether to demote to a public summary and retry.
    Reject,
}

pub fn route_policy(kind: PayloadKind, target: &ChannelTarget) -> RoutePolicy {
    if kind.is_trade_sensitive() && !target.is_private() {
        RoutePolicy::Reject
    } else {
        RoutePolicy::Send
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_kinds_blocked_on_groups() {
        let group = ChannelTarget::GroupChat { chat_id: 1 };
        for kind in [
            PayloadKind::TradeOpportunity,
            PayloadKind::Analytics,
            PayloadKind::Marketing,
        ] {
            assert_eq!(route_policy(kind, &group), RoutePolicy::Reject);
        }
    }

    #[test]
    fn public_kinds_allowed_on_groups() {
        let group = ChannelTarget::GroupChat { chat_id: 1 };
        for kind in [
            PayloadKind::Help,
            PayloadKind::Settings,
            PayloadKind::PublicSummary,
        ] {
            assert_eq!(route_policy(kind, &group), RoutePolicy::Send);
        }
    }

    #[test]
    fn everything_is_allowed_on_private_channels() {
        let private = ChannelTarget::PrivateChat { chat_id: 1 };
        let email = ChannelTarget::Email {
            address: "a@b.c".into(),
        };
        for kind in [
            PayloadKind::TradeOpportunity,
            PayloadKind::Analytics,
            PayloadKind::Marketing,
            PayloadKind::Help,
            PayloadKind::Settings,
            PayloadKind::PublicSummary,
        ] {
            assert_eq!(route_policy(kind, &private), RoutePolicy::Send);
            assert_eq!(route_policy(kind, &email), RoutePolicy::Send);
        }
    }
}
