use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zenload_core::{
    load_config, validate_config, DownloadManager, Extractor, GatewayBackend, MessagingGateway,
    SettingsStore, SqliteSettingsStore, TelegramGateway, YtDlpExtractor,
};
use zenload_server::api::create_router;
use zenload_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("ZENLOAD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    // Hash of the effective config, to tell deployments apart in logs
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded"
    );

    // Messaging gateway
    let gateway: Arc<dyn MessagingGateway> = match config.gateway.backend {
        GatewayBackend::Telegram => {
            let telegram = config
                .gateway
                .telegram
                .clone()
                .context("Telegram backend selected but no [gateway.telegram] section provided")?;
            info!("Initializing Telegram gateway at {}", telegram.api_url);
            Arc::new(TelegramGateway::new(telegram).context("Failed to create Telegram gateway")?)
        }
    };

    // Extraction service
    let extractor: Arc<dyn Extractor> = Arc::new(YtDlpExtractor::new(config.extractor.clone()));
    info!("Using extractor: {}", extractor.name());

    // Settings store
    let settings: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettingsStore::new(&config.database.path, config.settings.clone())
            .context("Failed to create settings store")?,
    );
    info!("Settings store initialized at {:?}", config.database.path);

    tokio::fs::create_dir_all(&config.downloads.download_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create download directory {:?}",
                config.downloads.download_dir
            )
        })?;

    let manager = Arc::new(DownloadManager::new(
        config.downloads.clone(),
        extractor,
        gateway,
        settings,
    ));
    let shutdown_timeout = config.downloads.shutdown_timeout();

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&manager)));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped, draining downloads...");
    let report = manager.shutdown(shutdown_timeout).await;
    if report.timed_out {
        error!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Some downloads did not finish before the shutdown timeout"
        );
    }
    info!(
        cancelled_queued = report.cancelled_queued,
        cancelled_in_flight = report.cancelled_in_flight,
        elapsed_ms = report.elapsed_ms,
        "Shutdown complete"
    );

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
