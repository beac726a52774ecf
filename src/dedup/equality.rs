//! Equivalence between two records of the same grouping key.
//!
//! Two records describe the same physical match when they agree on game,
//! mode, round, type and both players' loadouts, and their timestamps are at
//! most `tolerance` apart. The declared winner is not part of equivalence:
//! a disagreement is reported as a data-quality signal instead.

use std::time::Duration;

use crate::models::MatchRecord;

/// Default timestamp tolerance window.
pub const DEFAULT_TOLERANCE_SECS: u64 = 10;

/// Outcome of comparing two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Different matches.
    Distinct,
    /// Same match; `winner_conflict` is set when the reports disagree on the winner.
    Duplicate { winner_conflict: bool },
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Verdict::Duplicate { .. })
    }
}

/// Structural equality plus a timestamp tolerance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqualityModel {
    tolerance: Duration,
}

impl EqualityModel {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Exact-match part of equivalence. Players are compared in canonical order.
    pub fn structurally_equal(&self, a: &MatchRecord, b: &MatchRecord) -> bool {
        a.game_id() == b.game_id()
            && a.mode() == b.mode()
            && a.round() == b.round()
            && a.match_type() == b.match_type()
            && a.players()[0].same_loadout(&b.players()[0])
            && a.players()[1].same_loadout(&b.players()[1])
    }

    /// `|a - b| <= tolerance`, at full timestamp precision.
    pub fn within_tolerance(&self, a: &MatchRecord, b: &MatchRecord) -> bool {
        let (earlier, later) = if a.timestamp() <= b.timestamp() {
            (a.timestamp(), b.timestamp())
        } else {
            (b.timestamp(), a.timestamp())
        };
        match (later - earlier).to_std() {
            Ok(delta) => delta <= self.tolerance,
            Err(_) => false,
        }
    }

    pub fn compare(&self, a: &MatchRecord, b: &MatchRecord) -> Verdict {
        if !self.structurally_equal(a, b) || !self.within_tolerance(a, b) {
            return Verdict::Distinct;
        }
        Verdict::Duplicate {
            winner_conflict: a.winner_slot() != b.winner_slot(),
        }
    }

    pub fn equivalent(&self, a: &MatchRecord, b: &MatchRecord) -> bool {
        self.compare(a, b).is_duplicate()
    }
}

impl Default for EqualityModel {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TOLERANCE_SECS))
    }
}
