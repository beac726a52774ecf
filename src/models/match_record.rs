//! Canonical match record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlayerRecord;

/// A validated match between two players.
///
/// Players are always held in canonical order (sorted by tag), whatever order
/// the reporter listed them in. Fields are private so a record cannot change
/// after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MatchRecordWire")]
pub struct MatchRecord {
    #[serde(rename = "date")]
    timestamp: DateTime<Utc>,

    #[serde(rename = "game")]
    game_id: String,

    mode: String,

    round: i64,

    #[serde(rename = "type")]
    match_type: String,

    /// Winning slot (0 or 1); omitted when unknown
    #[serde(rename = "winner", skip_serializing_if = "Option::is_none")]
    winner_slot: Option<u8>,

    players: [PlayerRecord; 2],
}

/// Decoding shape; canonicalized through [`MatchRecord::new`].
#[derive(Deserialize)]
struct MatchRecordWire {
    date: DateTime<Utc>,
    game: String,
    mode: String,
    #[serde(default)]
    round: i64,
    #[serde(rename = "type")]
    match_type: String,
    #[serde(default)]
    winner: Option<u8>,
    players: [PlayerRecord; 2],
}

impl From<MatchRecordWire> for MatchRecord {
    fn from(wire: MatchRecordWire) -> Self {
        MatchRecord::new(
            wire.date,
            wire.game,
            wire.mode,
            wire.round,
            wire.match_type,
            wire.winner,
            wire.players,
        )
    }
}

impl MatchRecord {
    /// Build a canonical record. Players are sorted by tag.
    pub fn new(
        timestamp: DateTime<Utc>,
        game_id: String,
        mode: String,
        round: i64,
        match_type: String,
        winner_slot: Option<u8>,
        players: [PlayerRecord; 2],
    ) -> Self {
        let [first, second] = players;
        let players = if first.canonical_cmp(&second).is_gt() {
            [second, first]
        } else {
            [first, second]
        };

        Self {
            timestamp,
            game_id,
            mode,
            round,
            match_type,
            winner_slot: winner_slot.filter(|slot| *slot <= 1),
            players,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn round(&self) -> i64 {
        self.round
    }

    pub fn match_type(&self) -> &str {
        &self.match_type
    }

    pub fn winner_slot(&self) -> Option<u8> {
        self.winner_slot
    }

    /// Players in canonical (tag-sorted) order.
    pub fn players(&self) -> &[PlayerRecord; 2] {
        &self.players
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn player(tag: &str) -> PlayerRecord {
        PlayerRecord::new(tag.to_string(), "0123456789abcdef".to_string(), "king".to_string())
    }

    fn record(players: [PlayerRecord; 2]) -> MatchRecord {
        MatchRecord::new(
            Utc.with_ymd_and_hms(2024, 9, 23, 16, 4, 46).unwrap(),
            "pathOfLegend".to_string(),
            "Ranked1v1".to_string(),
            0,
            "PvP".to_string(),
            Some(1),
            players,
        )
    }

    #[test]
    fn test_players_sorted_on_construction() {
        let rec = record([player("#BBB"), player("#AAA")]);
        assert_eq!(rec.players()[0].tag, "#AAA");
        assert_eq!(rec.players()[1].tag, "#BBB");
    }

    #[test]
    fn test_reporting_order_irrelevant() {
        let a = record([player("#AAA"), player("#BBB")]);
        let b = record([player("#BBB"), player("#AAA")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_range_winner_is_unknown() {
        let rec = MatchRecord::new(
            Utc::now(),
            "g".to_string(),
            "m".to_string(),
            0,
            "t".to_string(),
            Some(7),
            [player("#A"), player("#B")],
        );
        assert_eq!(rec.winner_slot(), None);
    }

    #[test]
    fn test_serialization_uses_wire_names() {
        let rec = record([player("#BBB"), player("#AAA")]);
        let json = serde_json::to_value(&rec).unwrap();

        assert_eq!(json["date"], "2024-09-23T16:04:46Z");
        assert_eq!(json["game"], "pathOfLegend");
        assert_eq!(json["type"], "PvP");
        assert_eq!(json["winner"], 1);
        assert_eq!(json["players"][0]["utag"], "#AAA");
    }

    #[test]
    fn test_unknown_winner_omitted() {
        let rec = MatchRecord::new(
            Utc::now(),
            "g".to_string(),
            "m".to_string(),
            0,
            "t".to_string(),
            None,
            [player("#A"), player("#B")],
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("winner").is_none());
    }

    #[test]
    fn test_decode_recanonicalizes() {
        let json = serde_json::json!({
            "date": "2024-09-23T16:04:46Z",
            "game": "pathOfLegend",
            "mode": "Ranked1v1",
            "round": 0,
            "type": "PvP",
            "winner": 1,
            "players": [
                {"utag": "#BBB", "deck": "0123456789abcdef", "tower": "king"},
                {"utag": "#AAA", "deck": "0123456789abcdef", "tower": "king"}
            ]
        });
        let decoded: MatchRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record([player("#AAA"), player("#BBB")]));
    }
}
