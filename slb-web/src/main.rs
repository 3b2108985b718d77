//! slb-web - Sample Log Book operator interface
//!
//! Serves the sample table, the enrollment form and the attachment pages,
//! and answers the host's enrollment prompts through the Scan State Store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use slb_common::config::{load_config, RootFolderInitializer, RootFolderResolver};
use slb_common::db::init_database;
use slb_common::events::EventBus;
use slb_common::{ScanStateStore, TagRegistry};
use slb_web::{build_router, AppState, ScanWatcher, EVENT_BUS_CAPACITY};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for slb-web
#[derive(Parser, Debug)]
#[command(name = "slb-web")]
#[command(about = "Operator interface for the Sample Log Book")]
#[command(version)]
struct Args {
    /// Root folder holding the database and attachments
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides [web].bind from the config file
    #[arg(short, long, env = "SLB_WEB_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slb_web=info,slb_common=info,tower_http=info".into()),
        )
        .init();

    info!("Starting Sample Log Book web interface v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let root_folder = RootFolderResolver::new("slb-web")
        .with_cli_arg(args.root_folder)
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
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let store = ScanStateStore::spawn(pool.clone());
    let registry = TagRegistry::new(pool);
    let events = EventBus::new(EVENT_BUS_CAPACITY);

    let shutdown = CancellationToken::new();
    let watcher = ScanWatcher::new(store.clone(), events.clone(), config.handshake.consumer_poll())
        .spawn(shutdown.clone());

    let state = AppState::new(
        store,
        registry,
        events,
        initializer.attachments_path(),
        &config.handshake,
    );
    let consumer = state.consumer.clone();
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.web.bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("slb-web listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal().await;
                shutdown.cancel();
            }
        })
        .await
        .context("Server error")?;

    consumer.cancel_pulse_resets();
    if let Err(e) = watcher.await {
        warn!("Scan watcher ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
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
