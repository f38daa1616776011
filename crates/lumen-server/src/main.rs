//! # lumen-server
//!
//! Lumen server binary — wires the store, marketplace client, sync
//! service, and export surface together and serves the HTTP API.

mod context;
mod errors;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use lumen_scraper::{ClientConfig, SourceClient};
use lumen_store::{ConnectionConfig, Store};
use lumen_sync::{SyncConfig, SyncOrchestrator, SyncService};

use context::AppContext;

/// Lumen drone show platform server.
#[derive(Parser, Debug)]
#[command(name = "lumen-server", about = "Lumen drone show platform server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value = "8420")]
    port: u16,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Data directory (session file, downloads).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Formation marketplace base URL.
    #[arg(long, default_value = "https://market.skybrush.example.com")]
    source_url: String,

    /// Marketplace login email.
    #[arg(long, env = "LUMEN_SOURCE_EMAIL")]
    source_email: Option<String>,

    /// Marketplace login password.
    #[arg(long, env = "LUMEN_SOURCE_PASSWORD", hide_env_values = true)]
    source_password: Option<String>,
}

impl Cli {
    fn default_data_dir() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".lumen")
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumen=info,lumen_server=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(Cli::default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir: {}", data_dir.display()))?;

    let db_path = cli
        .db_path
        .unwrap_or_else(|| data_dir.join("lumen.db"));
    ensure_parent_dir(&db_path)?;
    let store = Store::open(&db_path, &ConnectionConfig::default())
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    info!(db = %db_path.display(), "database ready");

    let mut client_config = ClientConfig::new(&cli.source_url, data_dir.clone());
    match (cli.source_email.as_deref(), cli.source_password.as_deref()) {
        (Some(email), Some(password)) => {
            client_config = client_config.with_credentials(email, password);
        }
        _ => info!("marketplace credentials not configured; sync will be unavailable"),
    }
    let client = Arc::new(SourceClient::new(client_config).context("Failed to build client")?);

    let orchestrator = Arc::new(SyncOrchestrator::new(
        client,
        store.clone(),
        SyncConfig::new("skybrush-market"),
    ));
    let sync = SyncService::new(store.clone(), orchestrator);

    let ctx = AppContext::new(store, sync);
    let app = routes::router(ctx);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "lumen server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
