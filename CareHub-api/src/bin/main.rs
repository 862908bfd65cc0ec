use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use care_hub_api::{create_application, AppState};
use care_hub_data::media::ImageUploader;
use care_hub_data::store::{InMemoryDocumentStore, SqliteDocumentStore};
use care_hub_data::DocumentStore;
use care_hub_domain::auth::TokenValidator;
use care_hub_domain::config::{AppConfig, StoreBackend};
use care_hub_domain::database;
use care_hub_domain::services::Services;

/// The main entry point for the CareHub API server
///
/// Loads configuration, opens the document store, wires the services and
/// serves the router until Ctrl+C or SIGTERM.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    if dotenv().is_err() {
        eprintln!("Warning: .env file not found or couldn't be read. Using environment variables.");
    }

    // Initialize tracing for structured logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_ansi(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stdout),
        )
        .with(env_filter)
        .init();

    info!("Starting CareHub API server");

    let config = AppConfig::from_env().context("invalid configuration")?;
    let store = open_store(&config)?;

    let media = ImageUploader::from_configs(config.image_hosts.clone()).context("invalid image host configuration")?;
    info!("Image uploads use {} host(s)", media.host_count());

    let validator = TokenValidator::new(&config.jwt_secret, &config.jwt_issuer).context("invalid token settings")?;
    let services = Services::new(store, &config, media);
    let state = AppState::new(services, Arc::new(validator)).with_cors_origins(config.cors_origins.clone());

    let app = create_application(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Open the configured document store
fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store, data is lost on restart");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        StoreBackend::Sqlite => {
            let data_dir = PathBuf::from(&config.data_dir);
            if !data_dir.exists() {
                info!("Creating data directory: {}", data_dir.display());
                std::fs::create_dir_all(&data_dir)
                    .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
            }

            // An explicit DB_SQLITE_PATH wins over the data directory
            if std::env::var("DB_SQLITE_PATH").is_err() {
                let db_path = data_dir.join("carehub.db");
                std::env::set_var("DB_SQLITE_PATH", db_path.to_string_lossy().to_string());
                info!("Set DB_SQLITE_PATH to {}", db_path.display());
            }

            let pool = database::initialize_database_pool().context("failed to initialize database pool")?;
            if let Some(info) = database::get_connection_info() {
                info!("Database: {}", info);
            }
            Ok(Arc::new(SqliteDocumentStore::new(pool)))
        }
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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

    info!("Shutting down server...");
}
