//! Filesystem operations for a dedup run.
//!
//! - Input shard discovery and raw line reading
//! - JSONL reading/writing for the intermediate store and output shards
//! - Run directory layout (`part-r-*`, `_temporary/`, `_SUCCESS`)

mod input;
mod jsonl;

pub use input::*;
pub use jsonl::*;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to list input: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Paths inside a run's output directory.
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub output_dir: PathBuf,
}

impl RunLayout {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Scratch space for Local Phase spills; removed after a successful run.
    pub fn temporary_dir(&self) -> PathBuf {
        self.output_dir.join("_temporary")
    }

    /// Key-sorted run written by spill number `spill` of map task `shard`
    /// for reducer `reducer`.
    pub fn spill_path(&self, shard: u32, spill: u32, reducer: usize) -> PathBuf {
        self.temporary_dir()
            .join(format!("map-{:05}", shard))
            .join(format!("reduce-{:05}-spill-{:05}.jsonl", reducer, spill))
    }

    /// Reducer output before the run commits.
    pub fn pending_part_path(&self, reducer: usize) -> PathBuf {
        self.temporary_dir()
            .join(format!("part-r-{:05}.jsonl", reducer))
    }

    /// Final output shard for `reducer`.
    pub fn part_path(&self, reducer: usize) -> PathBuf {
        self.output_dir.join(format!("part-r-{:05}.jsonl", reducer))
    }

    pub fn success_path(&self) -> PathBuf {
        self.output_dir.join("_SUCCESS")
    }
}

/// Names starting with `_` or `.` are bookkeeping, never data.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(true, |name| name.starts_with('_') || name.starts_with('.'))
}
