//! Wall-clock helpers.
//!
//! Components take `now_ms` as an argument wherever the value participates in
//! a decision, so tests can drive time explicitly; these helpers exist only
//! at the outermost call sites.

use chrono::{DateTime, Utc};

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// UTC calendar date (`YYYY-MM-DD`) for a millisecond timestamp. Daily quota
/// ledgers are keyed on this string.
pub fn utc_date(ts_ms: u64) -> String {
    let dt = DateTime::<Utc>::from_timestamp_millis(ts_ms as i64).unwrap_or_default();
    dt.format("%Y-%m-%d").to_string()
}

/// Millisecond timestamp of the next UTC midnight after `ts_ms`.
pub fn next_utc_midnight_ms(ts_ms: u64) -> u64 {
    const DAY_MS: u64 = 24 * 60 * 60 * 1000;
    (ts_ms / DAY_MS + 1) * DAY_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_date_formats_day_key() {
        // 2024-03-01T12:30:00Z
        assert_eq!(utc_date(1_709_296_200_000), "2024-03-01");
        assert_eq!(utc_date(0), "1970-01-01");
    }

    #[test]
    fn midnight_rollover() {
        let just_before = 1_709_337_599_000; // 2024-03-01T23:59:59Z
        let midnight = next_utc_midnight_ms(just_before);
        assert_eq!(utc_date(midnight), "2024-03-02");
        assert_eq!(midnight % (24 * 60 * 60 * 1000), 0);
    }
}
