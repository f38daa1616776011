//! Standalone bulk-import job.
//!
//! Reads a JSON array of formation records from a file and upserts them
//! through the same store adapter the sync pipeline uses, so imports are
//! idempotent against already-synced data.
//!
//! ```sh
//! lumen-import --db-path ~/.lumen/lumen.db --file formations.json --mode all
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use lumen_core::formation::Formation;
use lumen_core::job::SyncMode;
use lumen_store::{ConnectionConfig, Store};

/// Bulk-import formations from a JSON file.
#[derive(Parser, Debug)]
#[command(name = "lumen-import", about = "Bulk-import formations from a JSON file")]
struct Cli {
    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: PathBuf,

    /// JSON file containing an array of formation records.
    #[arg(long)]
    file: PathBuf,

    /// Upsert mode: new, all, or force.
    #[arg(long, default_value = "all")]
    mode: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let Some(mode) = SyncMode::parse(&cli.mode) else {
        bail!("unknown mode: {} (expected new, all, or force)", cli.mode);
    };

    let data = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let records: Vec<Formation> =
        serde_json::from_str(&data).context("Import file must be a JSON array of formations")?;
    info!(count = records.len(), mode = mode.as_str(), "import file loaded");

    let store = Store::open(&cli.db_path, &ConnectionConfig::default())
        .with_context(|| format!("Failed to open database: {}", cli.db_path.display()))?;

    let report = store.bulk_import(&records, mode)?;
    for (name, message) in &report.failed {
        warn!(%name, "record failed: {message}");
    }
    info!(
        succeeded = report.succeeded,
        failed = report.failed.len(),
        "bulk import complete"
    );

    if report.succeeded == 0 && !report.failed.is_empty() {
        bail!("every record failed to import");
    }
    Ok(())
}
