//! Record validation.
//!
//! Turns an untrusted parsed JSON value into a canonical [`MatchRecord`], or a
//! [`Rejection`] naming the first check that failed. Checks run in order:
//!
//! 1. Shape: an object with a two-element `players` array, a `date` (or
//!    `timestamp`) string, and `game`/`mode`/`type` strings.
//! 2. Timestamp: the date must parse as an RFC 3339 instant.
//! 3. Player fields: non-empty `utag`, a `deck` string, non-empty `tower`.
//!    Scalar tags and tower skins are taken in their text form.
//! 4. Deck length: exactly 16 characters per player.
//!
//! Everything else is optional and defaults to zero or empty.

use std::fmt;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{MatchRecord, PlayerRecord, DECK_LENGTH};

/// Why a line was dropped. Always recoverable; never aborts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Rejection {
    #[error("malformed shape")]
    MalformedShape,

    #[error("missing player field")]
    MissingPlayerField,

    #[error("invalid deck length")]
    InvalidDeckLength,

    #[error("unparsable timestamp")]
    UnparsableTimestamp,
}

/// Per-kind rejection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub malformed_shape: u64,
    pub missing_player_field: u64,
    pub invalid_deck_length: u64,
    pub unparsable_timestamp: u64,
}

impl RejectionCounts {
    /// Count one rejection.
    pub fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::MalformedShape => self.malformed_shape += 1,
            Rejection::MissingPlayerField => self.missing_player_field += 1,
            Rejection::InvalidDeckLength => self.invalid_deck_length += 1,
            Rejection::UnparsableTimestamp => self.unparsable_timestamp += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.malformed_shape
            + self.missing_player_field
            + self.invalid_deck_length
            + self.unparsable_timestamp
    }
}

impl AddAssign for RejectionCounts {
    fn add_assign(&mut self, other: Self) {
        self.malformed_shape += other.malformed_shape;
        self.missing_player_field += other.missing_player_field;
        self.invalid_deck_length += other.invalid_deck_length;
        self.unparsable_timestamp += other.unparsable_timestamp;
    }
}

impl fmt::Display for RejectionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed={} missing_player_field={} invalid_deck={} bad_timestamp={}",
            self.malformed_shape,
            self.missing_player_field,
            self.invalid_deck_length,
            self.unparsable_timestamp
        )
    }
}

/// Parse and validate one input line.
///
/// Lines that are not JSON count as [`Rejection::MalformedShape`].
pub fn validate_line(line: &str) -> Result<MatchRecord, Rejection> {
    validate_bytes(line.as_bytes())
}

/// Same as [`validate_line`] for raw bytes; invalid UTF-8 is malformed.
pub fn validate_bytes(line: &[u8]) -> Result<MatchRecord, Rejection> {
    let value: Value = serde_json::from_slice(line).map_err(|_| Rejection::MalformedShape)?;
    validate(&value)
}

/// Validate a parsed JSON value into a canonical record.
pub fn validate(value: &Value) -> Result<MatchRecord, Rejection> {
    let root = value.as_object().ok_or(Rejection::MalformedShape)?;

    let players = match root.get("players").and_then(Value::as_array) {
        Some(players) if players.len() == 2 => players,
        _ => return Err(Rejection::MalformedShape),
    };
    let date = root
        .get("date")
        .or_else(|| root.get("timestamp"))
        .and_then(Value::as_str)
        .ok_or(Rejection::MalformedShape)?;
    let game_id = required_str(root, "game")?;
    let mode = required_str(root, "mode")?;
    let match_type = required_str(root, "type")?;

    let timestamp = parse_timestamp(date).ok_or(Rejection::UnparsableTimestamp)?;

    let first = players[0].as_object().ok_or(Rejection::MalformedShape)?;
    let second = players[1].as_object().ok_or(Rejection::MalformedShape)?;
    check_player_fields(first)?;
    check_player_fields(second)?;
    check_deck_length(first)?;
    check_deck_length(second)?;

    let winner_slot = match opt_int_field(root, "winner") {
        Some(0) => Some(0),
        Some(1) => Some(1),
        _ => None,
    };

    Ok(MatchRecord::new(
        timestamp,
        game_id.to_string(),
        mode.to_string(),
        int_field(root, "round"),
        match_type.to_string(),
        winner_slot,
        [build_player(first), build_player(second)],
    ))
}

/// Parse an ISO-8601 instant with an explicit offset into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, Rejection> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or(Rejection::MalformedShape)
}

fn check_player_fields(player: &Map<String, Value>) -> Result<(), Rejection> {
    let has_tag = text_field(player, "utag").is_some_and(|tag| !tag.is_empty());
    let has_deck = player.get("deck").is_some_and(Value::is_string);
    let has_tower = text_field(player, "tower").is_some_and(|tower| !tower.is_empty());

    if has_tag && has_deck && has_tower {
        Ok(())
    } else {
        Err(Rejection::MissingPlayerField)
    }
}

fn check_deck_length(player: &Map<String, Value>) -> Result<(), Rejection> {
    let deck = player.get("deck").and_then(Value::as_str).unwrap_or_default();
    if deck.chars().count() == DECK_LENGTH {
        Ok(())
    } else {
        Err(Rejection::InvalidDeckLength)
    }
}

fn build_player(player: &Map<String, Value>) -> PlayerRecord {
    PlayerRecord {
        tag: text_field(player, "utag").unwrap_or_default(),
        clan_tag: text_field(player, "ctag").unwrap_or_default(),
        trophies: int_field(player, "trophies"),
        experience: int_field(player, "exp"),
        league: int_field(player, "league"),
        best_league: int_field(player, "bestleague"),
        deck: str_field(player, "deck"),
        evolution_cards: text_field(player, "evo").unwrap_or_default(),
        tower_skin: text_field(player, "tower").unwrap_or_default(),
        strength: float_field(player, "strength"),
        crowns_taken: int_field(player, "crown"),
        elixir_average: float_field(player, "elixir"),
        card_touches: int_field(player, "touch"),
        score: int_field(player, "score"),
    }
}

fn str_field(obj: &Map<String, Value>, field: &str) -> String {
    obj.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Text form of a scalar; tags sometimes arrive as bare numbers.
fn text_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integers arrive as numbers or numeric strings; anything else is 0.
fn int_field(obj: &Map<String, Value>, field: &str) -> i64 {
    opt_int_field(obj, field).unwrap_or(0)
}

fn opt_int_field(obj: &Map<String, Value>, field: &str) -> Option<i64> {
    match obj.get(field) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_field(obj: &Map<String, Value>, field: &str) -> f64 {
    match obj.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw_player(tag: &str, deck: &str) -> Value {
        json!({
            "utag": tag, "ctag": "#CLAN", "trophies": 6500, "exp": 50,
            "league": 7, "bestleague": 8, "deck": deck, "evo": "1a",
            "tower": "princess", "strength": 14.5, "crown": 3,
            "elixir": 3.6, "touch": 24, "score": 100
        })
    }

    fn raw_match() -> Value {
        json!({
            "date": "2024-09-23T16:04:46Z",
            "game": "pathOfLegend",
            "mode": "Ranked1v1",
            "round": 0,
            "type": "pathOfLegend",
            "winner": 1,
            "players": [
                raw_player("#BBB", "0011223344556677"),
                raw_player("#AAA", "8899aabbccddeeff")
            ]
        })
    }

    #[test]
    fn test_valid_record_is_canonical() {
        let record = validate(&raw_match()).unwrap();
        assert_eq!(record.players()[0].tag, "#AAA");
        assert_eq!(record.players()[0].deck, "8899aabbccddeeff");
        assert_eq!(record.players()[1].tag, "#BBB");
        assert_eq!(record.winner_slot(), Some(1));
        assert_eq!(record.players()[1].elixir_average, 3.6);
        assert_eq!(record.players()[1].best_league, 8);
    }

    #[test]
    fn test_missing_players_rejected() {
        let mut value = raw_match();
        value.as_object_mut().unwrap().remove("players");
        assert_eq!(validate(&value), Err(Rejection::MalformedShape));
    }

    #[test]
    fn test_three_players_rejected() {
        let mut value = raw_match();
        value["players"]
            .as_array_mut()
            .unwrap()
            .push(raw_player("#CCC", "0011223344556677"));
        assert_eq!(validate(&value), Err(Rejection::MalformedShape));
    }

    #[test]
    fn test_missing_date_rejected() {
        let mut value = raw_match();
        value.as_object_mut().unwrap().remove("date");
        assert_eq!(validate(&value), Err(Rejection::MalformedShape));
    }

    #[test]
    fn test_timestamp_alias_accepted() {
        let mut value = raw_match();
        let obj = value.as_object_mut().unwrap();
        let date = obj.remove("date").unwrap();
        obj.insert("timestamp".to_string(), date);
        assert!(validate(&value).is_ok());
    }

    #[test]
    fn test_unparsable_timestamp() {
        let mut value = raw_match();
        value["date"] = json!("yesterday at noon");
        assert_eq!(validate(&value), Err(Rejection::UnparsableTimestamp));
    }

    #[test]
    fn test_offset_timestamp_normalized_to_utc() {
        let mut value = raw_match();
        value["date"] = json!("2024-09-23T18:04:46+02:00");
        let record = validate(&value).unwrap();
        assert_eq!(record.timestamp(), parse_timestamp("2024-09-23T16:04:46Z").unwrap());
    }

    #[test]
    fn test_missing_match_level_fields_rejected() {
        for field in ["game", "mode", "type"] {
            let mut value = raw_match();
            value.as_object_mut().unwrap().remove(field);
            assert_eq!(validate(&value), Err(Rejection::MalformedShape), "{}", field);
        }
    }

    #[test]
    fn test_missing_tag_rejected() {
        let mut value = raw_match();
        value["players"][0].as_object_mut().unwrap().remove("utag");
        assert_eq!(validate(&value), Err(Rejection::MissingPlayerField));
    }

    #[test]
    fn test_empty_tag_rejected() {
        let mut value = raw_match();
        value["players"][1]["utag"] = json!("");
        assert_eq!(validate(&value), Err(Rejection::MissingPlayerField));
    }

    #[test]
    fn test_numeric_tag_taken_as_text() {
        let mut value = raw_match();
        value["players"][0]["utag"] = json!(12345);
        let record = validate(&value).unwrap();
        assert_eq!(record.players()[0].tag, "#AAA");
        assert_eq!(record.players()[1].tag, "12345");
    }

    #[test]
    fn test_null_or_object_tag_rejected() {
        for tag in [json!(null), json!({"id": "#BBB"}), json!(["#BBB"])] {
            let mut value = raw_match();
            value["players"][0]["utag"] = tag.clone();
            assert_eq!(validate(&value), Err(Rejection::MissingPlayerField), "{}", tag);
        }
    }

    #[test]
    fn test_missing_deck_rejected() {
        let mut value = raw_match();
        value["players"][1].as_object_mut().unwrap().remove("deck");
        assert_eq!(validate(&value), Err(Rejection::MissingPlayerField));
    }

    #[test]
    fn test_empty_tower_rejected() {
        let mut value = raw_match();
        value["players"][0]["tower"] = json!("");
        assert_eq!(validate(&value), Err(Rejection::MissingPlayerField));
    }

    #[test]
    fn test_deck_length_boundaries() {
        for (deck, ok) in [
            ("001122334455667", false),
            ("0011223344556677", true),
            ("00112233445566778", false),
            ("ffffffffffffffff", true),
        ] {
            let mut value = raw_match();
            value["players"][0]["deck"] = json!(deck);
            let result = validate(&value);
            if ok {
                assert!(result.is_ok(), "deck {} should pass", deck);
            } else {
                assert_eq!(result, Err(Rejection::InvalidDeckLength), "deck {}", deck);
            }
        }
    }

    #[test]
    fn test_player_field_checked_before_deck_length() {
        let mut value = raw_match();
        value["players"][0]["deck"] = json!("short");
        value["players"][1]["utag"] = json!("");
        assert_eq!(validate(&value), Err(Rejection::MissingPlayerField));
    }

    #[test]
    fn test_optional_fields_default() {
        let value = json!({
            "date": "2024-09-23T16:04:46Z",
            "game": "g", "mode": "m", "type": "t",
            "players": [
                {"utag": "#A", "deck": "0011223344556677", "tower": "king", "trophies": null},
                {"utag": "#B", "deck": "0011223344556677", "tower": "king"}
            ]
        });
        let record = validate(&value).unwrap();
        assert_eq!(record.round(), 0);
        assert_eq!(record.winner_slot(), None);
        assert_eq!(record.players()[0].trophies, 0);
        assert_eq!(record.players()[0].clan_tag, "");
        assert_eq!(record.players()[0].strength, 0.0);
    }

    #[test]
    fn test_winner_out_of_range_is_unknown() {
        let mut value = raw_match();
        value["winner"] = json!(2);
        assert_eq!(validate(&value).unwrap().winner_slot(), None);

        value["winner"] = json!("draw");
        assert_eq!(validate(&value).unwrap().winner_slot(), None);

        value["winner"] = json!(0);
        assert_eq!(validate(&value).unwrap().winner_slot(), Some(0));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let mut value = raw_match();
        value["round"] = json!("3");
        value["players"][0]["trophies"] = json!("7000");
        let record = validate(&value).unwrap();
        assert_eq!(record.round(), 3);
        let bbb = &record.players()[1];
        assert_eq!(bbb.trophies, 7000);
    }

    #[test]
    fn test_validate_line_not_json() {
        assert_eq!(validate_line("{not json"), Err(Rejection::MalformedShape));
        assert_eq!(validate_line("[1,2]"), Err(Rejection::MalformedShape));
    }

    #[test]
    fn test_validate_bytes_invalid_utf8() {
        assert_eq!(
            validate_bytes(&[b'"', 0xff, b'"']),
            Err(Rejection::MalformedShape)
        );
    }

    #[test]
    fn test_rejection_counts() {
        let mut counts = RejectionCounts::default();
        counts.record(Rejection::MalformedShape);
        counts.record(Rejection::InvalidDeckLength);
        counts.record(Rejection::InvalidDeckLength);

        let mut total = RejectionCounts::default();
        total += counts;
        total += counts;
        assert_eq!(total.invalid_deck_length, 4);
        assert_eq!(total.total(), 6);
    }
}
