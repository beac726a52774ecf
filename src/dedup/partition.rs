//! Key to reducer routing.

use crate::models::MatchKey;

/// Reducer responsible for `key`. Stable across runs, threads and platforms.
///
/// `reducers` is clamped to at least one.
pub fn reducer_for(key: &MatchKey, reducers: usize) -> usize {
    let reducers = reducers.max(1) as u64;
    (key.digest() % reducers) as usize
}
