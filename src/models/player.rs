//! Player record model.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Number of characters in an encoded deck (8 cards, 2 hex chars each).
pub const DECK_LENGTH: usize = 16;

/// One side of a match, as reported.
///
/// Field names on the wire follow the reporter format (`utag`, `ctag`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Unique player tag
    #[serde(rename = "utag")]
    pub tag: String,

    /// Clan tag, empty when the player has no clan
    #[serde(rename = "ctag", default)]
    pub clan_tag: String,

    #[serde(default)]
    pub trophies: i64,

    #[serde(rename = "exp", default)]
    pub experience: i64,

    #[serde(default)]
    pub league: i64,

    #[serde(rename = "bestleague", default)]
    pub best_league: i64,

    /// Encoded deck, always `DECK_LENGTH` characters once validated
    pub deck: String,

    /// Evolution cards in play
    #[serde(rename = "evo", default)]
    pub evolution_cards: String,

    /// Tower skin identifier
    #[serde(rename = "tower")]
    pub tower_skin: String,

    #[serde(default)]
    pub strength: f64,

    #[serde(rename = "crown", default)]
    pub crowns_taken: i64,

    #[serde(rename = "elixir", default)]
    pub elixir_average: f64,

    #[serde(rename = "touch", default)]
    pub card_touches: i64,

    #[serde(default)]
    pub score: i64,
}

impl PlayerRecord {
    /// Create a player with the required fields; every optional stat is zeroed.
    pub fn new(tag: String, deck: String, tower_skin: String) -> Self {
        Self {
            tag,
            clan_tag: String::new(),
            trophies: 0,
            experience: 0,
            league: 0,
            best_league: 0,
            deck,
            evolution_cards: String::new(),
            tower_skin,
            strength: 0.0,
            crowns_taken: 0,
            elixir_average: 0.0,
            card_touches: 0,
            score: 0,
        }
    }

    /// Builder method to set evolution cards.
    pub fn with_evolution_cards(mut self, evo: impl Into<String>) -> Self {
        self.evolution_cards = evo.into();
        self
    }

    /// Same physical participant: tag, deck, evolutions and tower skin.
    pub fn same_loadout(&self, other: &PlayerRecord) -> bool {
        self.tag == other.tag
            && self.deck == other.deck
            && self.evolution_cards == other.evolution_cards
            && self.tower_skin == other.tower_skin
    }

    /// Canonical ordering: by tag, then by loadout for identical tags.
    pub fn canonical_cmp(&self, other: &PlayerRecord) -> Ordering {
        self.tag
            .cmp(&other.tag)
            .then_with(|| self.deck.cmp(&other.deck))
            .then_with(|| self.evolution_cards.cmp(&other.evolution_cards))
            .then_with(|| self.tower_skin.cmp(&other.tower_skin))
    }
}
