//! # Match Cleaner
//!
//! Fuzzy deduplication of game-match records reported by unreliable sources.
//!
//! ## Architecture
//!
//! - **models**: Canonical match/player records, grouping keys
//! - **validate**: Untrusted JSON to canonical records, with rejection reasons
//! - **dedup**: Keying, tolerance-based equality, Local/Global collapse phases
//! - **storage**: Input shards, JSONL intermediate store and output shards
//! - **pipeline**: Parallel map, shuffle barrier and reduce over a run
//! - **config**: Configuration loading and validation

pub mod config;
pub mod dedup;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod validate;

pub use models::*;

use std::time::Duration;

/// Parse a human-friendly duration string (e.g., "10s", "500ms", "2m", "1h").
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, millis) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else {
        (s, 1000)
    };

    let num: u64 = num_str.trim().parse().ok()?;
    Some(Duration::from_millis(num.checked_mul(millis)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_parse_duration_millis() {
        assert_eq!(parse_duration("1500ms"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_duration_minutes_and_hours() {
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_duration_default_seconds() {
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_parse_duration_zero() {
        assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-5s"), None);
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration("18446744073709551615h"), None);
    }
}
