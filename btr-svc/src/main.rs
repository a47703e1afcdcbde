//! btr-svc - BuildTrace drawing diff service
//!
//! Accepts drawing-pair jobs over HTTP, diffs them on a background consumer,
//! stores change reports in the blob store and serves metrics and health.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use btr_common::blob::FsBlobStore;
use btr_common::config::load_config;
use clap::Parser;
use tracing::{info, warn};

use btr_svc::{build_router, logging, queue, AppState, BuildInfo};

/// BuildTrace drawing diff service
#[derive(Debug, Parser)]
#[command(name = "btr-svc", version, about)]
struct Args {
    /// Path to TOML config file
    #[arg(long, env = "BTR_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides [server] bind)
    #[arg(long, env = "BTR_BIND")]
    bind: Option<String>,

    /// Blob storage root directory (overrides [storage] root)
    #[arg(long, env = "BTR_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Before config loading so its warnings reach the log
    let log_filter = logging::init()?;

    info!("Starting BuildTrace diff service (btr-svc) {}", BuildInfo::current());

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(root) = args.storage_root {
        config.storage.root = root;
    }

    match log_filter.apply_configured_level(&config.logging.level) {
        Ok(true) => info!("Log level: {}", config.logging.level),
        Ok(false) => info!("Log level taken from RUST_LOG"),
        Err(e) => warn!("{}; keeping {}", e, logging::DEFAULT_LEVEL),
    }

    info!("Blob storage root: {}", config.storage.root.display());
    info!("Results bucket: {}", config.storage.bucket);
    info!("Failure policy: {:?}", config.worker.failure_policy);

    let blobs = Arc::new(FsBlobStore::new(config.storage.root.clone()));
    let (publisher, receiver) = queue::channel(config.worker.queue_capacity);

    let state = AppState::new(&config, blobs, Arc::new(publisher))
        .context("Failed to build application state")?;
    let consumer = queue::spawn_consumer(
        receiver,
        Arc::clone(&state.processor),
        state.failure_policy,
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("btr-svc listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app).await?;

    // Router (and its publisher) dropped; let the consumer drain
    consumer.await?;

    Ok(())
}
