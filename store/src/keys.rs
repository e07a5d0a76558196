//! Key namespace layout.
//!
//! Every kv key in the system is built here so the namespaces stay greppable:
//! `rate:*`, `sliding:*`, `bucket:*`, `session:*`, `opp:active:*`,
//! `ledger-cache:*`, `cred-cache:*`.

use uuid::Uuid;

pub fn rate_window(scope: &str, window_index: u64) -> String {
    format!("rate:{scope}:{window_index}")
}

pub fn sliding(scope: &str) -> String {
    format!("sliding:{scope}")
}

pub fn bucket(scope: &str) -> String {
    format!("bucket:{scope}")
}

pub fn session(session_id: &Uuid) -> String {
    format!("session:{session_id}")
}

pub fn opportunity_active(opportunity_id: &Uuid) -> String {
    format!("opp:active:{opportunity_id}")
}

pub const OPPORTUNITY_ACTIVE_PREFIX: &str = "opp:active:";

pub fn ledger_cache(user_id: &Uuid, date: &str, context_id: &str) -> String {
    format!("ledger-cache:{user_id}:{date}:{context_id}")
}

pub fn cred_cache(user_id: &Uuid, venue: &str) -> String {
    format!("cred-cache:{user_id}:{venue}")
}

pub fn cred_cache_prefix(user_id: &Uuid) -> String {
    format!("cred-cache:{user_id}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_prefix_disjoint() {
        let id = Uuid::nil();
        let keys = [
            rate_window("u1", 42),
            sliding("u1"),
            bucket("binance"),
            session(&id),
            opportunity_active(&id),
            ledger_cache(&id, "2024-03-01", "private"),
            cred_cache(&id, "bybit"),
        ];

        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert!(!a.starts_with(b), "{a} collides with {b}");
                }
            }
        }
    }
}
