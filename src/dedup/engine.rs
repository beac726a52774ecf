//! Two-phase dedup engine.
//!
//! Both phases run the same collapse over groups of same-key records:
//! sort by timestamp (ties broken by arrival), then walk the sequence keeping
//! a "last kept" record and dropping anything equivalent to it. Comparing
//! against the last *kept* record, not the last seen one, settles the
//! non-transitive case: records at 0s, 9s and 18s collapse to {0s, 18s}.
//!
//! A record that is not equivalent to the last kept one becomes the new last
//! kept record, even when it differs only in deck or type. A rematch reported
//! between two reports of the same match therefore splits that match's run.
//!
//! The Local Phase only sees one partition and exists to cut volume before
//! the shuffle. The Global Phase reruns the collapse over every partition's
//! survivors for a key and produces the final set.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::equality::{EqualityModel, Verdict};
use super::key::build_key;
use crate::models::{ArrivalId, MatchKey, MatchRecord};

/// Engine misuse errors. Data problems never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("group {0} is no longer collecting")]
    NotCollecting(MatchKey),

    #[error("record keyed {found} pushed into group {expected}")]
    KeyMismatch { expected: MatchKey, found: MatchKey },

    #[error("key {found} arrived after {previous} in key-sorted input")]
    OutOfOrder { previous: MatchKey, found: MatchKey },
}

/// An accepted record together with its grouping key and source position.
///
/// This is also the unit written to the intermediate store between phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedRecord {
    pub key: MatchKey,
    pub arrival: ArrivalId,
    pub record: MatchRecord,
}

impl KeyedRecord {
    pub fn new(arrival: ArrivalId, record: MatchRecord) -> Self {
        Self {
            key: build_key(&record),
            arrival,
            record,
        }
    }

    /// Final output form, optionally carrying the grouping key as `id`.
    pub fn into_output(self, emit_id: bool) -> OutputRecord {
        OutputRecord {
            id: emit_id.then_some(self.key),
            record: self.record,
        }
    }
}

/// A surviving canonical match as written to the output shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MatchKey>,

    #[serde(flatten)]
    pub record: MatchRecord,
}

/// Counters produced by a collapse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseStats {
    pub input: u64,
    pub dropped: u64,
    pub winner_conflicts: u64,
}

impl AddAssign for CollapseStats {
    fn add_assign(&mut self, other: Self) {
        self.input += other.input;
        self.dropped += other.dropped;
        self.winner_conflicts += other.winner_conflicts;
    }
}

/// Which aggregation scope a collapse runs in; only affects logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Local,
    Global,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Local => write!(f, "local"),
            Phase::Global => write!(f, "global"),
        }
    }
}

/// Sort-then-adjacent-run collapse over records sharing one key.
///
/// Survivors come back in timestamp order.
pub fn collapse(
    mut records: Vec<KeyedRecord>,
    model: &EqualityModel,
    stats: &mut CollapseStats,
) -> Vec<KeyedRecord> {
    stats.input += records.len() as u64;
    if records.len() < 2 {
        return records;
    }

    records.sort_by(|a, b| {
        a.record
            .timestamp()
            .cmp(&b.record.timestamp())
            .then_with(|| a.arrival.cmp(&b.arrival))
    });

    let mut keep = vec![false; records.len()];
    let mut last_kept: Option<usize> = None;
    for (idx, candidate) in records.iter().enumerate() {
        if let Some(prev) = last_kept {
            let survivor = &records[prev];
            if let Verdict::Duplicate { winner_conflict } =
                model.compare(&survivor.record, &candidate.record)
            {
                stats.dropped += 1;
                if winner_conflict {
                    stats.winner_conflicts += 1;
                    warn!(
                        key = %candidate.key,
                        kept = %survivor.arrival,
                        dropped = %candidate.arrival,
                        "Duplicate reports disagree on winner"
                    );
                }
                continue;
            }
        }
        keep[idx] = true;
        last_kept = Some(idx);
    }

    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, kept)| kept.then_some(record))
        .collect()
}

/// Lifecycle of one key's record set within a phase.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupState {
    Collecting(Vec<KeyedRecord>),
    Resolved(Vec<KeyedRecord>),
    Emitted,
}

/// Records for one key moving through `Collecting -> Resolved -> Emitted`.
#[derive(Debug, Clone)]
pub struct KeyGroup {
    key: MatchKey,
    state: GroupState,
}

impl KeyGroup {
    pub fn new(key: MatchKey) -> Self {
        Self {
            key,
            state: GroupState::Collecting(Vec::new()),
        }
    }

    pub fn key(&self) -> &MatchKey {
        &self.key
    }

    pub fn state(&self) -> &GroupState {
        &self.state
    }

    /// Add a record. Only valid while collecting, and only for this key.
    pub fn collect(&mut self, record: KeyedRecord) -> Result<(), EngineError> {
        if record.key != self.key {
            return Err(EngineError::KeyMismatch {
                expected: self.key.clone(),
                found: record.key,
            });
        }
        match &mut self.state {
            GroupState::Collecting(records) => {
                records.push(record);
                Ok(())
            }
            _ => Err(EngineError::NotCollecting(self.key.clone())),
        }
    }

    /// Run the collapse. Groups that already resolved are left alone.
    pub fn resolve(&mut self, model: &EqualityModel, stats: &mut CollapseStats) {
        if let GroupState::Collecting(records) = &mut self.state {
            let records = std::mem::take(records);
            self.state = GroupState::Resolved(collapse(records, model, stats));
        }
    }

    /// Hand out the survivors. Returns `None` unless the group is resolved,
    /// so a partially collected group can never be emitted.
    pub fn emit(&mut self) -> Option<Vec<KeyedRecord>> {
        match std::mem::replace(&mut self.state, GroupState::Emitted) {
            GroupState::Resolved(survivors) => Some(survivors),
            other => {
                self.state = other;
                None
            }
        }
    }
}

/// Survivors and counters of a Local Phase run.
#[derive(Debug, Clone, Default)]
pub struct PhaseOutput {
    pub survivors: Vec<KeyedRecord>,
    pub stats: CollapseStats,
}

/// Walk key-sorted records one key group at a time, handing each survivor
/// to `emit` as soon as its group resolves.
fn resolve_sorted<I, E, F>(
    phase: Phase,
    records: I,
    model: &EqualityModel,
    mut emit: F,
) -> Result<CollapseStats, E>
where
    I: IntoIterator<Item = Result<KeyedRecord, E>>,
    E: From<EngineError>,
    F: FnMut(KeyedRecord) -> Result<(), E>,
{
    let mut stats = CollapseStats::default();
    let mut keys = 0u64;
    let mut group: Option<KeyGroup> = None;

    for record in records {
        let record = record?;
        if let Some(current) = &group {
            if record.key < *current.key() {
                return Err(EngineError::OutOfOrder {
                    previous: current.key().clone(),
                    found: record.key,
                }
                .into());
            }
        }
        if group.as_ref().map_or(true, |g| *g.key() != record.key) {
            if let Some(done) = group.take() {
                flush(done, model, &mut stats, &mut emit)?;
                keys += 1;
            }
            group = Some(KeyGroup::new(record.key.clone()));
        }
        if let Some(current) = group.as_mut() {
            current.collect(record)?;
        }
    }
    if let Some(done) = group.take() {
        flush(done, model, &mut stats, &mut emit)?;
        keys += 1;
    }

    debug!(
        phase = %phase,
        keys,
        input = stats.input,
        dropped = stats.dropped,
        "Phase complete"
    );
    Ok(stats)
}

fn flush<E, F>(
    mut group: KeyGroup,
    model: &EqualityModel,
    stats: &mut CollapseStats,
    emit: &mut F,
) -> Result<(), E>
where
    F: FnMut(KeyedRecord) -> Result<(), E>,
{
    group.resolve(model, stats);
    for survivor in group.emit().unwrap_or_default() {
        emit(survivor)?;
    }
    Ok(())
}

/// Partition-local volume reduction.
///
/// Sees only the records of one partition, so its output is not final:
/// duplicates routed to other partitions survive until the Global Phase.
/// Survivors come back ordered by key, then timestamp.
pub fn local_phase(
    partition: Vec<KeyedRecord>,
    model: &EqualityModel,
) -> Result<PhaseOutput, EngineError> {
    let mut by_key: BTreeMap<MatchKey, Vec<KeyedRecord>> = BTreeMap::new();
    for record in partition {
        by_key.entry(record.key.clone()).or_default().push(record);
    }

    let mut survivors = Vec::new();
    let stats = resolve_sorted(
        Phase::Local,
        by_key.into_values().flatten().map(Ok),
        model,
        |record| {
            survivors.push(record);
            Ok::<(), EngineError>(())
        },
    )?;
    Ok(PhaseOutput { survivors, stats })
}

/// Final resolution over the union of every partition's survivors.
///
/// `sorted` must be ordered by key and hold *all* Local Phase survivors for
/// each key it contains. Only one key group is held in memory at a time; a
/// key that goes backwards is an [`EngineError::OutOfOrder`].
pub fn global_phase<I, E, F>(sorted: I, model: &EqualityModel, emit: F) -> Result<CollapseStats, E>
where
    I: IntoIterator<Item = Result<KeyedRecord, E>>,
    E: From<EngineError>,
    F: FnMut(KeyedRecord) -> Result<(), E>,
{
    resolve_sorted(Phase::Global, sorted, model, emit)
}
