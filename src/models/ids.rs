//! Grouping keys and arrival identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Order-independent grouping key for candidate duplicates.
///
/// Built from game, mode, round and the canonical player tags; the
/// timestamp is deliberately not part of it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchKey(String);

impl MatchKey {
    /// Create a key from an already-built string.
    pub fn new(key: String) -> Self {
        Self(key)
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable 64-bit digest of the key (first 8 bytes of SHA-256).
    pub fn digest(&self) -> u64 {
        let hash = Sha256::digest(self.0.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash[..8]);
        u64::from_be_bytes(prefix)
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchKey({})", self.0)
    }
}

impl From<String> for MatchKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MatchKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Source position of an accepted record: input shard index, then line number.
///
/// Used as the tie-breaker when two records share a timestamp, so ordering
/// never depends on which worker read a line first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrivalId {
    pub shard: u32,
    pub line: u64,
}

impl ArrivalId {
    pub fn new(shard: u32, line: u64) -> Self {
        Self { shard, line }
    }
}

impl fmt::Display for ArrivalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shard, self.line)
    }
}
