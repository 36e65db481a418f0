//! Beverage Identification (bevid-id) - Main entry point
//!
//! Serves the identification wizard and its JSON API on localhost.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bevid_common::config::{
    default_config_path, ensure_directory_exists, load_toml_config, resolve_api_key,
    resolve_root_folder, store_path, API_KEY_ENV, DEFAULT_PORT, ROOT_FOLDER_ENV,
};
use bevid_common::events::EventBus;
use bevid_common::policy::DecisionPolicy;
use bevid_common::store::{Dataset, KeyValueStore, TRAINING_DATASET};
use bevid_id::services::Enricher;
use bevid_id::{build_router, AppState};
use clap::Parser;
use tokio::signal;
use tracing::info;

/// Command-line arguments for bevid-id
#[derive(Parser, Debug)]
#[command(name = "bevid-id")]
#[command(about = "Beverage identification wizard")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "BEVID_PORT")]
    port: Option<u16>,

    /// Folder holding the key-value store
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Path of the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bevid_id={0},bevid_common={0},tower_http=info", config.logging.level)
                    .into()
            }),
        )
        .init();

    info!(
        "Starting bevid-id v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config file: {}", config_path.display());

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    ensure_directory_exists(&root_folder).context("Failed to create root folder")?;
    info!("Root folder: {}", root_folder.display());

    let store = KeyValueStore::open(store_path(&root_folder))
        .await
        .context("Failed to open key-value store")?;
    let dataset = Dataset::new(TRAINING_DATASET, Arc::new(store));
    info!(
        "✓ Dataset '{}' loaded ({} examples)",
        dataset.name(),
        dataset.count().await?
    );

    // Thresholds were validated when the config loaded
    let policy = DecisionPolicy::new(config.thresholds);
    info!(
        "Confidence thresholds: high {:.2}, medium {:.2}",
        policy.thresholds().high,
        policy.thresholds().medium
    );

    let enricher = Enricher::from_config(&config.enrichment, resolve_api_key(API_KEY_ENV, &config))
        .context("Failed to initialize enrichment client")?;

    let state = AppState::new(policy, dataset, enricher, EventBus::new(100));
    let app = build_router(state);

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
