//! Per-route limit table.
//!
//! Patterns are exact paths or a prefix ending in `/*`; the longest pattern
//! wins. The scope key prefers the authenticated user id and falls back to
//! the client IP.

use std::sync::Arc;

use uuid::Uuid;

use crate::decision::Decision;
use crate::fixed::FixedWindowLimiter;

#[derive(Debug, Clone)]
pub struct RouteLimit {
    pub pattern: &'static str,
    /// None applies to every method.
    pub method: Option<&'static str>,
    pub per_minute: u32,
}

#[derive(Debug, Clone)]
pub enum Scope {
    User(Uuid),
    Ip(String),
}

impl Scope {
    /// Authenticated identity overrides IP.
    pub fn from_request(user_id: Option<Uuid>, client_ip: &str) -> Self {
        match user_id {
            Some(id) => Scope::User(id),
            None => Scope::Ip(client_ip.to_string()),
        }
    }

    pub fn key(&self, pattern: &str) -> String {
        match self {
            Scope::User(id) => format!("u:{id}:{pattern}"),
            Scope::Ip(ip) => format!("ip:{ip}:{pattern}"),
        }
    }
}

pub struct RouteTable {
    rules: Vec<RouteLimit>,
    limiter: FixedWindowLimiter,
    /// Requests on paths with no matching rule pass through unmetered.
    default_per_minute: Option<u32>,
}

impl RouteTable {
    pub fn new(kv: Arc<dyn store::KvStore>, rules: Vec<RouteLimit>) -> Self {
        Self {
            rules,
            limiter: FixedWindowLimiter::new(kv),
            default_per_minute: None,
        }
    }

    pub fn with_default_per_minute(mut self, per_minute: u32) -> Self {
        self.default_per_minute = Some(per_minute);
        self
    }

    /// The stock table from the configuration surface.
    pub fn default_rules() -> Vec<RouteLimit> {
        vec![
            RouteLimit { pattern: "/health", method: None, per_minute: 300 },
            RouteLimit { pattern: "/api/*", method: None, per_minute: 60 },
            RouteLimit { pattern: "/webhook/*", method: None, per_minute: 120 },
            RouteLimit { pattern: "/admin/*", method: Some("GET"), per_minute: 30 },
            RouteLimit { pattern: "/admin/*", method: Some("POST"), per_minute: 20 },
            RouteLimit { pattern: "/assets/*", method: None, per_minute: 300 },
        ]
    }

    fn matches(pattern: &str, path: &str) -> bool {
        match pattern.strip_suffix("/*") {
            Some(prefix) => path.starts_with(prefix) && path.len() > prefix.len(),
            None => pattern == path,
        }
    }

    /// Find the governing rule: longest pattern first, method-specific rules
    /// beat catch-all ones at equal length.
    pub fn rule_for(&self, method: &str, path: &str) -> Option<&RouteLimit> {
        self.rules
            .iter()
            .filter(|r| Self::matches(r.pattern, path))
            .filter(|r| r.method.is_none_or(|m| m.eq_ignore_ascii_case(method)))
            .max_by_key(|r| (r.pattern.len(), r.method.is_some()))
    }

    pub async fn check(
        &self,
        method: &str,
        path: &str,
        scope: &Scope,
        now_ms: u64,
    ) -> Decision {
        let (pattern, per_minute) = match self.rule_for(method, path) {
            Some(rule) => (rule.pattern, rule.per_minute),
            None => match self.default_per_minute {
                Some(limit) => ("<default>", limit),
                None => {
                    return Decision::Allowed {
                        remaining: u32::MAX,
                        reset_at_ms: 0,
                    };
                }
            },
        };

        let scope_key = scope.key(pattern);
        self.limiter.check(&scope_key, per_minute, 60, now_ms).await
    }
}
