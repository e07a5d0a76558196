use thiserror::Error;

/// Where a rendered message is sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelTarget {
    PrivateChat { chat_id: i64 },
    GroupChat { chat_id: i64 },
    Email { address: String },
}

impl ChannelTarget {
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            ChannelTarget::PrivateChat { .. } | ChannelTarget::Email { .. }
        )
    }

    /// Channel tag recorded in `distribution_records`.
    pub fn as_record_str(&self) -> String {
        match self {
            ChannelTarget::PrivateChat { chat_id } => format!("private:{chat_id}"),
            ChannelTarget::GroupChat { chat_id } => format!("group:{chat_id}"),
            ChannelTarget::Email { address } => format!("email:{address}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    TradeOpportunity,
    Analytics,
    Marketing,
    Help,
    Settings,
    PublicSummary,
}

impl PayloadKind {
    /// Kinds carrying trade specifics; these must never land in a group.
    pub fn is_trade_sensitive(&self) -> bool {
        matches!(
            self,
            PayloadKind::TradeOpportunity | PayloadKind::Analytics | PayloadKind::Marketing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::TradeOpportunity => "TradeOpportunity",
            PayloadKind::Analytics => "Analytics",
            PayloadKind::Marketing => "Marketing",
            PayloadKind::Help => "Help",
            PayloadKind::Settings => "Settings",
            PayloadKind::PublicSummary => "PublicSummary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("payload kind {kind} not allowed on this channel")]
    PolicyViolation { kind: &'static str },

    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("terminal delivery failure [{code}]: {message}")]
    Terminal { code: String, message: String },
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transient(_))
    }

    pub fn code(&self) -> &str {
        match self {
            NotifyError::PolicyViolation { .. } => "policy_violation",
            NotifyError::Transient(_) => "transient",
            NotifyError::Terminal { code, .. } => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_split_matches_policy_table() {
        assert!(PayloadKind::TradeOpportunity.is_trade_sensitive());
        assert!(PayloadKind::Analytics.is_trade_sensitive());
        assert!(PayloadKind::Marketing.is_trade_sensitive());
        assert!(!PayloadKind::Help.is_trade_sensitive());
        assert!(!PayloadKind::Settings.is_trade_sensitive());
        assert!(!PayloadKind::PublicSummary.is_trade_sensitive());
    }

    #[test]
    fn channel_record_tags() {
        assert_eq!(
            ChannelTarget::PrivateChat { chat_id: 7 }.as_record_str(),
            "private:7"
        );
        assert_eq!(
            ChannelTarget::GroupChat { chat_id: -10 }.as_record_str(),
            "group:-10"
        );
    }
}
