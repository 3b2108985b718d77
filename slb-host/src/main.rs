//! Sample Log Book host (slb-host) - Main entry point
//!
//! Reads tag identifiers from a reader backend and runs the host side of the
//! enrollment handshake until Ctrl+C / SIGTERM.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use slb_common::config::{load_config, RootFolderInitializer, RootFolderResolver};
use slb_common::db::init_database;
use slb_common::{ScanStateStore, TagId, TagRegistry};
use slb_host::{LineReader, Poller, ScriptedReader, TagReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for slb-host
#[derive(Parser, Debug)]
#[command(name = "slb-host")]
#[command(about = "NFC reader host for the Sample Log Book")]
#[command(version)]
struct Args {
    /// Root folder holding the database and attachments
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Read tag identifiers line by line from this file or FIFO ("-" for stdin)
    #[arg(short, long, default_value = "-", env = "SLB_HOST_INPUT")]
    input: String,

    /// Replay these identifiers instead of reading input (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "input")]
    simulate: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slb_host=info,slb_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Sample Log Book host v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new("slb-host")
        .with_cli_arg(args.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let config = load_config(initializer.root_folder());
    config
        .handshake
        .validate()
        .context("Invalid handshake timings")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let store = ScanStateStore::spawn(pool.clone());
    let registry = TagRegistry::new(pool);

    let reader = open_reader(&args).await?;
    let poller = Poller::new(reader, store, registry, config.handshake);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    poller.run(shutdown).await;

    info!("Host shutdown complete");
    Ok(())
}

/// Reader backend selected on the command line
async fn open_reader(args: &Args) -> Result<Box<dyn TagReader>> {
    if !args.simulate.is_empty() {
        let reads = args
            .simulate
            .iter()
            .map(|s| TagId::parse(s))
            .collect::<slb_common::Result<Vec<_>>>()
            .context("Invalid --simulate identifier")?;
        info!("Simulating {} reads", reads.len());
        return Ok(Box::new(ScriptedReader::from_reads(reads)));
    }

    if args.input == "-" {
        info!("Reading tag identifiers from stdin");
        return Ok(Box::new(LineReader::stdin()));
    }

    let path = PathBuf::from(&args.input);
    info!("Reading tag identifiers from {}", path.display());
    let reader = LineReader::open(&path)
        .await
        .with_context(|| format!("Failed to open reader input {}", path.display()))?;
    Ok(Box::new(reader))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
