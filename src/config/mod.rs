//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::dedup::{EqualityModel, DEFAULT_TOLERANCE_SECS};
use crate::parse_duration;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Dedup behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Timestamp tolerance window (e.g. "10s", "1m")
    #[serde(default = "default_tolerance")]
    pub tolerance: String,

    /// Prefix each output record with its grouping key as `id`
    #[serde(default = "default_emit_id")]
    pub emit_id: bool,
}

fn default_tolerance() -> String {
    format!("{}s", DEFAULT_TOLERANCE_SECS)
}

fn default_emit_id() -> bool {
    true
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            emit_id: default_emit_id(),
        }
    }
}

impl DedupConfig {
    pub fn tolerance(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.tolerance).ok_or_else(|| {
            ConfigError::ValidationError(format!("Invalid tolerance: {:?}", self.tolerance))
        })
    }

    pub fn equality_model(&self) -> Result<EqualityModel, ConfigError> {
        Ok(EqualityModel::new(self.tolerance()?))
    }
}

/// Map/reduce execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of reducers, and therefore output shards
    #[serde(default = "default_reducers")]
    pub reducers: usize,

    /// Accepted records a map task buffers before running the Local Phase
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold: usize,

    /// Worker threads; 0 uses the rayon default
    #[serde(default)]
    pub workers: usize,
}

fn default_reducers() -> usize {
    1
}

fn default_spill_threshold() -> usize {
    100_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reducers: default_reducers(),
            spill_threshold: default_spill_threshold(),
            workers: 0,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dedup: DedupConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dedup.tolerance()?;

        if self.pipeline.reducers == 0 {
            return Err(ConfigError::ValidationError(
                "Reducer count must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.spill_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "Spill threshold must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
