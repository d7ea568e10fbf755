//! prdesk-ingest - media query ingestion service
//!
//! Receives forwarded emails from the mail bridge, classifies them, extracts
//! media queries and stores them for review.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use prdesk_common::config::{
    default_config_path, load_toml_config, prepare_root_folder, resolve_root_folder,
    LoggingConfig, ROOT_FOLDER_ENV,
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prdesk_ingest::services::{backend_from_config, IngestionOrchestrator, ParseContext};
use prdesk_ingest::AppState;

const MODULE_NAME: &str = "prdesk-ingest";

/// Command-line arguments for prdesk-ingest
#[derive(Parser, Debug)]
#[command(name = "prdesk-ingest")]
#[command(about = "Media query ingestion service for prdesk")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PRDESK_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Path to the TOML config file
    #[arg(short, long, env = "PRDESK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = locate_config(&args);
    let toml_config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    init_tracing(&toml_config.logging)?;

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", config_path.display());

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = prepare_root_folder(&root_folder)?;
    info!("Root folder: {}", root_folder.display());
    info!("Database: {}", db_path.display());

    let db_pool = prdesk_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let webhook_secret = prdesk_ingest::config::resolve_webhook_secret(&db_pool, &toml_config).await?;
    let llm_api_key = prdesk_ingest::config::resolve_llm_api_key(&db_pool, &toml_config).await?;
    let backend = backend_from_config(&toml_config.llm, llm_api_key)
        .context("Failed to configure LLM backend")?;

    let default_tz = ParseContext::zone_from_config(&toml_config.parsing.default_timezone);
    let lock_wait_ms = prdesk_ingest::db::settings::get_max_lock_wait_ms(&db_pool).await?;

    let orchestrator = IngestionOrchestrator::new(db_pool.clone(), default_tz)
        .with_backend(backend, Duration::from_secs(toml_config.llm.timeout_secs.max(1)))
        .with_lock_wait_ms(lock_wait_ms);
    info!(
        default_tz = %default_tz,
        llm_enabled = orchestrator.llm_enabled(),
        lock_wait_ms,
        "Ingestion pipeline ready"
    );

    let state = AppState::new(db_pool, orchestrator, webhook_secret);
    let app = prdesk_ingest::build_router(state);

    let port = args.port.unwrap_or(toml_config.port);
    let addr = format!("{}:{}", toml_config.bind_address, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Config file priority: `--config` → `<root folder>/prdesk-ingest.toml` → platform default
fn locate_config(args: &Args) -> PathBuf {
    if let Some(path) = &args.config {
        return path.clone();
    }

    let root_hint = args
        .root_folder
        .clone()
        .or_else(|| std::env::var(ROOT_FOLDER_ENV).ok().map(PathBuf::from));
    if let Some(root) = root_hint {
        let candidate = root.join(format!("{}.toml", MODULE_NAME));
        if candidate.exists() {
            return candidate;
        }
    }

    default_config_path(MODULE_NAME)
}

/// Console logging, plus a plain-text file when `logging.file` is set
///
/// `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "prdesk_ingest={level},prdesk_common={level},tower_http=info",
            level = logging.level
        )
        .into()
    });

    let file_layer = match &logging.file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
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
