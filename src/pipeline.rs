//! Dedup run driver.
//!
//! Coordinates one run over a set of input shards:
//! 1. Map: read each shard in parallel, validate lines, key accepted records
//! 2. Local Phase: every `spill_threshold` records, collapse the buffer and
//!    spill survivors into per-reducer files under `_temporary/`
//! 3. Barrier: all map tasks finish before any reducer starts
//! 4. Global Phase: each reducer k-way merges its key-sorted spill runs and
//!    resolves and writes one key group at a time into a pending output shard
//! 5. Commit: pending shards move into place and `_SUCCESS` is written
//!
//! Any infrastructure failure removes the output directory, so a failed run
//! never leaves partial output behind.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ConfigError};
use crate::dedup::{
    global_phase, local_phase, reducer_for, CollapseStats, EngineError, EqualityModel,
    KeyedRecord,
};
use crate::models::{ArrivalId, MatchKey};
use crate::storage::{
    discover_shards, JsonlIterator, JsonlReader, JsonlWriter, RunLayout, ShardLines,
    StorageError,
};
use crate::validate::{validate_bytes, RejectionCounts};

/// Errors that abort a run. Bad input lines are never among them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Output path already exists: {0}")]
    OutputExists(PathBuf),

    #[error("No input shards found in {0}")]
    NoInput(PathBuf),

    #[error("Reducer count must be greater than 0")]
    NoReducers,
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub model: EqualityModel,
    pub reducers: usize,
    pub spill_threshold: usize,
    pub workers: usize,
    pub emit_id: bool,
}

impl RunOptions {
    pub fn from_config(
        config: &AppConfig,
        input: PathBuf,
        output: PathBuf,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            input,
            output,
            model: config.dedup.equality_model()?,
            reducers: config.pipeline.reducers,
            spill_threshold: config.pipeline.spill_threshold,
            workers: config.pipeline.workers,
            emit_id: config.dedup.emit_id,
        })
    }
}

/// Line-level validation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub lines_read: u64,
    pub accepted: u64,
    pub rejected: RejectionCounts,
}

impl AddAssign for ValidationSummary {
    fn add_assign(&mut self, other: Self) {
        self.lines_read += other.lines_read;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
    }
}

/// Outcome of a successful run; also the content of `_SUCCESS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub shards: usize,
    pub reducers: usize,
    pub validation: ValidationSummary,
    pub local: CollapseStats,
    pub global: CollapseStats,
    pub emitted: u64,
}

impl RunReport {
    pub fn winner_conflicts(&self) -> u64 {
        self.local.winner_conflicts + self.global.winner_conflicts
    }
}

#[derive(Debug, Default)]
struct MapOutcome {
    validation: ValidationSummary,
    local: CollapseStats,
    spills: u32,
}

#[derive(Debug, Default)]
struct ReduceOutcome {
    global: CollapseStats,
    emitted: u64,
}

/// Execute a full dedup run.
pub fn run(options: &RunOptions) -> Result<RunReport, PipelineError> {
    if options.reducers == 0 {
        return Err(PipelineError::NoReducers);
    }
    if options.output.exists() {
        return Err(PipelineError::OutputExists(options.output.clone()));
    }
    let shards = discover_shards(&options.input)?;
    if shards.is_empty() {
        return Err(PipelineError::NoInput(options.input.clone()));
    }

    info!(
        "Starting run over {} shards from {:?} with {} reducers, tolerance {:?}",
        shards.len(),
        options.input,
        options.reducers,
        options.model.tolerance()
    );

    run_shards(&shards, options)
}

/// Run over an already discovered shard list. From here on any failure
/// removes the output directory.
fn run_shards(shards: &[PathBuf], options: &RunOptions) -> Result<RunReport, PipelineError> {
    let layout = RunLayout::new(options.output.clone());
    let result = fs::create_dir_all(layout.temporary_dir())
        .map_err(|e| PipelineError::from(StorageError::from(e)))
        .and_then(|()| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(options.workers)
                .build()
                .map_err(PipelineError::from)
        })
        .and_then(|pool| pool.install(|| execute(shards, &layout, options)));

    match result {
        Ok(report) => {
            info!(
                "Run complete: {} lines, {} accepted, {} rejected ({}), {} emitted, {} winner conflicts",
                report.validation.lines_read,
                report.validation.accepted,
                report.validation.rejected.total(),
                report.validation.rejected,
                report.emitted,
                report.winner_conflicts()
            );
            Ok(report)
        }
        Err(e) => {
            warn!("Run failed, removing {:?}: {}", layout.output_dir, e);
            if layout.output_dir.exists() {
                if let Err(cleanup) = fs::remove_dir_all(&layout.output_dir) {
                    warn!("Failed to remove {:?}: {}", layout.output_dir, cleanup);
                }
            }
            Err(e)
        }
    }
}

fn execute(
    shards: &[PathBuf],
    layout: &RunLayout,
    options: &RunOptions,
) -> Result<RunReport, PipelineError> {
    let mut report = RunReport {
        shards: shards.len(),
        reducers: options.reducers,
        ..Default::default()
    };

    let maps: Vec<MapOutcome> = shards
        .par_iter()
        .enumerate()
        .map(|(idx, path)| map_shard(idx as u32, path, layout, options))
        .collect::<Result<_, _>>()?;
    let mut spill_counts = Vec::with_capacity(maps.len());
    for outcome in maps {
        report.validation += outcome.validation;
        report.local += outcome.local;
        spill_counts.push(outcome.spills);
    }
    info!(
        "Map stage complete: {} accepted, {} dropped locally",
        report.validation.accepted, report.local.dropped
    );

    let reduces: Vec<ReduceOutcome> = (0..options.reducers)
        .into_par_iter()
        .map(|reducer| reduce(reducer, &spill_counts, layout, options))
        .collect::<Result<_, _>>()?;
    for outcome in reduces {
        report.global += outcome.global;
        report.emitted += outcome.emitted;
    }

    commit(layout, options.reducers, &report)?;
    Ok(report)
}

/// Validate one shard and run the Local Phase over bounded buffers of it.
fn map_shard(
    shard: u32,
    path: &Path,
    layout: &RunLayout,
    options: &RunOptions,
) -> Result<MapOutcome, PipelineError> {
    debug!("Map task {} reading {:?}", shard, path);

    let mut outcome = MapOutcome::default();
    let mut buffer: Vec<KeyedRecord> = Vec::new();

    for line in ShardLines::open(path)? {
        let (line_no, bytes) = line?;
        outcome.validation.lines_read += 1;

        match validate_bytes(&bytes) {
            Ok(record) => {
                outcome.validation.accepted += 1;
                buffer.push(KeyedRecord::new(ArrivalId::new(shard, line_no), record));
                if buffer.len() >= options.spill_threshold {
                    spill(std::mem::take(&mut buffer), shard, layout, options, &mut outcome)?;
                }
            }
            Err(rejection) => {
                outcome.validation.rejected.record(rejection);
                debug!(shard, line = line_no, %rejection, "Rejected line");
            }
        }
    }

    if !buffer.is_empty() {
        spill(buffer, shard, layout, options, &mut outcome)?;
    }

    debug!(
        "Map task {} done: {} lines, {} accepted, {} spills",
        shard, outcome.validation.lines_read, outcome.validation.accepted, outcome.spills
    );
    Ok(outcome)
}

/// Collapse one buffer and write its survivors as one key-sorted run per reducer.
fn spill(
    partition: Vec<KeyedRecord>,
    shard: u32,
    layout: &RunLayout,
    options: &RunOptions,
    outcome: &mut MapOutcome,
) -> Result<(), PipelineError> {
    let local = local_phase(partition, &options.model)?;
    outcome.local += local.stats;

    let mut routed: Vec<Vec<KeyedRecord>> = vec![Vec::new(); options.reducers];
    for record in local.survivors {
        routed[reducer_for(&record.key, options.reducers)].push(record);
    }

    for (reducer, batch) in routed.iter().enumerate() {
        JsonlWriter::new(layout.spill_path(shard, outcome.spills, reducer))
            .append_batch(batch)?;
    }
    outcome.spills += 1;
    Ok(())
}

/// K-way merge of key-sorted spill runs into one key-sorted stream.
///
/// Holds one record per run in memory.
struct SpillMerge {
    runs: Vec<JsonlIterator<KeyedRecord>>,
    heads: Vec<Option<KeyedRecord>>,
    queue: BinaryHeap<Reverse<(MatchKey, usize)>>,
}

impl SpillMerge {
    fn open(paths: &[PathBuf]) -> Result<Self, StorageError> {
        let mut merge = Self {
            runs: Vec::with_capacity(paths.len()),
            heads: Vec::with_capacity(paths.len()),
            queue: BinaryHeap::with_capacity(paths.len()),
        };
        for path in paths {
            merge
                .runs
                .push(JsonlReader::<KeyedRecord>::new(path.clone()).iter()?);
            merge.heads.push(None);
            merge.refill(merge.runs.len() - 1)?;
        }
        Ok(merge)
    }

    fn refill(&mut self, run: usize) -> Result<(), StorageError> {
        if let Some(record) = self.runs[run].next().transpose()? {
            self.queue.push(Reverse((record.key.clone(), run)));
            self.heads[run] = Some(record);
        }
        Ok(())
    }
}

impl Iterator for SpillMerge {
    type Item = Result<KeyedRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((_, run)) = self.queue.pop()?;
        let record = self.heads[run].take()?;
        if let Err(e) = self.refill(run) {
            return Some(Err(e));
        }
        Some(Ok(record))
    }
}

/// Merge every spill run for `reducer`, run the Global Phase key by key and
/// stream survivors into a pending shard.
fn reduce(
    reducer: usize,
    spill_counts: &[u32],
    layout: &RunLayout,
    options: &RunOptions,
) -> Result<ReduceOutcome, PipelineError> {
    let mut runs = Vec::new();
    for (shard, &spills) in spill_counts.iter().enumerate() {
        for spill in 0..spills {
            let path = layout.spill_path(shard as u32, spill, reducer);
            if path.exists() {
                runs.push(path);
            }
        }
    }
    debug!("Reducer {} merging {} spill runs", reducer, runs.len());

    let merged = SpillMerge::open(&runs)?.map(|record| record.map_err(PipelineError::from));
    let mut sink = JsonlWriter::new(layout.pending_part_path(reducer)).create()?;
    let global = global_phase(merged, &options.model, |record| {
        sink.write(&record.into_output(options.emit_id))
            .map_err(PipelineError::from)
    })?;
    let written = sink.finish()?;
    debug!("Reducer {} wrote {} records", reducer, written);

    Ok(ReduceOutcome {
        global,
        emitted: written as u64,
    })
}

/// Move pending shards into place, drop scratch data, mark success.
fn commit(layout: &RunLayout, reducers: usize, report: &RunReport) -> Result<(), PipelineError> {
    for reducer in 0..reducers {
        fs::rename(layout.pending_part_path(reducer), layout.part_path(reducer))
            .map_err(StorageError::from)?;
    }
    fs::remove_dir_all(layout.temporary_dir()).map_err(StorageError::from)?;

    let summary = serde_json::to_string_pretty(report).map_err(StorageError::from)?;
    fs::write(layout.success_path(), summary).map_err(StorageError::from)?;
    Ok(())
}

/// Validate every line under `input` without deduplicating or writing anything.
pub fn check(input: &Path) -> Result<ValidationSummary, PipelineError> {
    let shards = discover_shards(input)?;
    if shards.is_empty() {
        return Err(PipelineError::NoInput(input.to_path_buf()));
    }

    let summaries: Vec<ValidationSummary> = shards
        .par_iter()
        .map(|path| -> Result<ValidationSummary, PipelineError> {
            let mut summary = ValidationSummary::default();
            for line in ShardLines::open(path)? {
                let (_, bytes) = line?;
                summary.lines_read += 1;
                match validate_bytes(&bytes) {
                    Ok(_) => summary.accepted += 1,
                    Err(rejection) => summary.rejected.record(rejection),
                }
            }
            Ok(summary)
        })
        .collect::<Result<_, _>>()?;

    let mut total = ValidationSummary::default();
    for summary in summaries {
        total += summary;
    }
    Ok(total)
}
