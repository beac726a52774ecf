//! Grouping key derivation.

use crate::models::{MatchKey, MatchRecord};

/// Build the grouping key for a canonical record:
/// `game_mode_round_tagA_tagB`, tags in canonical order.
///
/// The timestamp is left out so that near-simultaneous reports of one match
/// land in the same group.
pub fn build_key(record: &MatchRecord) -> MatchKey {
    let [first, second] = record.players();
    MatchKey::new(format!(
        "{}_{}_{}_{}_{}",
        record.game_id(),
        record.mode(),
        record.round(),
        first.tag,
        second.tag
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayerRecord;
    use chrono::{Duration, TimeZone, Utc};

    fn player(tag: &str) -> PlayerRecord {
        PlayerRecord::new(tag.to_string(), "0011223344556677".to_string(), "king".to_string())
    }

    fn record(players: [PlayerRecord; 2], offset_secs: i64) -> MatchRecord {
        MatchRecord::new(
            Utc.with_ymd_and_hms(2024, 9, 23, 16, 4, 46).unwrap() + Duration::seconds(offset_secs),
            "pathOfLegend".to_string(),
            "Ranked1v1".to_string(),
            0,
            "pathOfLegend".to_string(),
            Some(0),
            players,
        )
    }

    #[test]
    fn test_key_format() {
        let key = build_key(&record([player("#AAA"), player("#BBB")], 0));
        assert_eq!(key.as_str(), "pathOfLegend_Ranked1v1_0_#AAA_#BBB");
    }

    #[test]
    fn test_key_player_order_invariant() {
        let a = build_key(&record([player("#AAA"), player("#BBB")], 0));
        let b = build_key(&record([player("#BBB"), player("#AAA")], 0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_ignores_timestamp() {
        let a = build_key(&record([player("#AAA"), player("#BBB")], 0));
        let b = build_key(&record([player("#AAA"), player("#BBB")], 3600));
        assert_eq!(a, b);
    }
}
