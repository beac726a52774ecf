use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use match_cleaner::config::AppConfig;
use match_cleaner::parse_duration;
use match_cleaner::pipeline::{self, RunOptions};

const DEFAULT_CONFIG: &str = "./match-cleaner.toml";

#[derive(Parser)]
#[command(name = "match-cleaner")]
#[command(about = "Fuzzy deduplication of game-match records")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults apply when the default file is absent)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, deduplicate and write canonical matches
    Run {
        /// Input file or directory of JSONL shards
        input: PathBuf,

        /// Output directory (must not exist)
        output: PathBuf,

        /// Timestamp tolerance window (e.g., "10s")
        #[arg(long)]
        tolerance: Option<String>,

        /// Number of reducers / output shards
        #[arg(long)]
        reducers: Option<usize>,

        /// Do not prefix output records with their grouping key
        #[arg(long)]
        no_id: bool,
    },

    /// Validate input and report rejection counts without writing anything
    Check {
        /// Input file or directory of JSONL shards
        input: PathBuf,
    },
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match explicit {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => AppConfig::from_file(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG)),
        None => Ok(AppConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting match-cleaner v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config?;

    match cli.command {
        Commands::Run {
            input,
            output,
            tolerance,
            reducers,
            no_id,
        } => {
            if let Some(tolerance) = tolerance {
                parse_duration(&tolerance)
                    .with_context(|| format!("Invalid --tolerance: {}", tolerance))?;
                config.dedup.tolerance = tolerance;
            }
            if let Some(reducers) = reducers {
                config.pipeline.reducers = reducers;
            }
            if no_id {
                config.dedup.emit_id = false;
            }

            let options = RunOptions::from_config(&config, input, output)?;
            let report = pipeline::run(&options)?;

            println!("\n=== Run Summary ===");
            println!("Input shards:      {}", report.shards);
            println!("Lines read:        {}", report.validation.lines_read);
            println!("Accepted:          {}", report.validation.accepted);
            println!("Rejected:          {}", report.validation.rejected.total());
            println!("  {}", report.validation.rejected);
            println!("Dropped (local):   {}", report.local.dropped);
            println!("Dropped (global):  {}", report.global.dropped);
            println!("Winner conflicts:  {}", report.winner_conflicts());
            println!("Emitted:           {}", report.emitted);
        }

        Commands::Check { input } => {
            let summary = pipeline::check(&input)?;

            println!("\n=== Validation Summary ===");
            println!("Lines read:  {}", summary.lines_read);
            println!("Accepted:    {}", summary.accepted);
            println!("Rejected:    {}", summary.rejected.total());
            println!("  {}", summary.rejected);
        }
    }

    Ok(())
}
