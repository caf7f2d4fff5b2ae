//! ILIAD - In-Line Inspection Alignment & Diagnostics
//!
//! Aligns multi-year ILI run sheets for a single pipeline and writes the
//! matched-anomaly, exception, and audit exports.
//!
//! # Usage
//!
//! ```bash
//! # Align a multi-year workbook with the in-memory store
//! iliad align inspections.xlsx
//!
//! # Durable store and a custom export directory
//! iliad align inspections.xlsx --db ./data/iliad-db --out ./exports
//!
//! # Single-sheet CSV (one synthetic current-year run; needs an existing
//! # dataset to align against, so this mostly exercises ingestion)
//! iliad align latest.csv
//! ```
//!
//! # Environment Variables
//!
//! - `ILIAD_CONFIG`: Path to a TOML config file (see `AlignmentConfig`)
//! - `ILIAD_ORACLE_URL`: Canonicalization oracle sidecar endpoint
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use iliad::config::{self, AlignmentConfig};
use iliad::ingest::{ingest_csv, ingest_workbook};
use iliad::normalize::normalize_dataset;
use iliad::oracle::{CanonOracle, HttpOracle};
use iliad::pipeline::JobCoordinator;
use iliad::storage::{MemoryStore, SledStore, Store};
use iliad::types::{JobStatus, StageStatusReport};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "iliad")]
#[command(about = "In-Line Inspection Alignment & Diagnostics")]
#[command(version)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a workbook or CSV, align every run pair, and export
    Align {
        /// Input workbook (.xlsx) or CSV file
        input: PathBuf,

        /// Dataset name (defaults to the input file stem)
        #[arg(long)]
        name: Option<String>,

        /// Sled database directory; omitted = in-memory store
        #[arg(long)]
        db: Option<PathBuf>,

        /// Export directory (overrides the config)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn is_workbook(path: &std::path::Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods")
    )
}

async fn run_align(
    input: PathBuf,
    name: Option<String>,
    db: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = config::get().clone();
    if let Some(out) = out {
        cfg.export_dir = out;
    }

    let store: Arc<dyn Store> = match db {
        Some(path) => {
            let store = SledStore::open(&path)
                .with_context(|| format!("opening sled store at {}", path.display()))?;
            info!(path = %path.display(), "Using sled store");
            Arc::new(store)
        }
        None => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let oracle: Option<Arc<dyn CanonOracle>> = match std::env::var("ILIAD_ORACLE_URL") {
        Ok(url) if !url.trim().is_empty() => {
            info!(endpoint = %url, "Canonicalization oracle enabled");
            Some(Arc::new(HttpOracle::new(&url, cfg.oracle_timeout_ms)))
        }
        _ => None,
    };

    // Ingest
    let parsed_runs = if is_workbook(&input) {
        ingest_workbook(&input).with_context(|| format!("ingesting {}", input.display()))?
    } else {
        vec![ingest_csv(&input).with_context(|| format!("ingesting {}", input.display()))?]
    };
    info!(runs = parsed_runs.len(), "Ingestion complete");

    // Normalize
    let dataset_name = name.unwrap_or_else(|| {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string())
    });
    let (dataset_id, outcomes) = normalize_dataset(
        &dataset_name,
        &parsed_runs,
        store.as_ref(),
        oracle.as_deref(),
        cfg.persist_batch_size,
    )
    .await
    .context("normalizing runs")?;
    let total_features: usize = outcomes.iter().map(|o| o.feature_count).sum();
    info!(dataset_id, total_features, "Normalization complete");

    // Align
    let coordinator = JobCoordinator::new(store, cfg);
    let job = coordinator.run_dataset(dataset_id).await?;
    let report = StageStatusReport::from(&job);
    println!("{}", serde_json::to_string_pretty(&report)?);
    coordinator.shutdown();

    match job.status {
        JobStatus::Done => Ok(()),
        _ => {
            let reason = job.error.unwrap_or_else(|| "unknown".to_string());
            bail!("job {} ended {}: {}", job.id, job.status.as_str(), reason)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let loaded = AlignmentConfig::load();
    if let Err(e) = loaded.validate() {
        warn!(error = %e, "Configuration invalid; using defaults");
        config::init(AlignmentConfig::default());
    } else {
        config::init(loaded);
    }

    match args.command {
        Command::Align {
            input,
            name,
            db,
            out,
        } => run_align(input, name, db, out).await,
    }
}
