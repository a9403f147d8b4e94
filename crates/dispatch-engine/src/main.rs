//! Dispatch engine binary.
//!
//! Wires the store, the roster, the broadcaster, and the HTTP/`WebSocket`
//! server together and serves until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `dispatch-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Open the store (in-memory seeded from config, or `PostgreSQL`)
//! 4. Load the roster and status catalog
//! 5. Serve the API until shutdown
//! 6. Close the store

mod error;

use std::path::Path;
use std::sync::Arc;

use dispatch_core::config::{LogFormat, StorageBackend};
use dispatch_core::{Broadcaster, DispatchConfig, MutationApi};
use dispatch_db::{MemoryStore, PgRosterStore, PostgresConfig, RosterData, RosterStore};
use dispatch_server::{AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Path of the configuration file, relative to the working directory.
const CONFIG_PATH: &str = "dispatch-config.yaml";

/// Application entry point for the dispatch engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config);
    info!(
        backend = ?config.storage.backend,
        port = config.server.port,
        queue_capacity = config.sync.queue_capacity,
        persist_timeout_ms = config.sync.persist_timeout_ms,
        "dispatch-engine starting"
    );

    // 3. Open the store.
    let store = open_store(&config).await?;
    info!(backend = store.backend(), "Store ready");

    // 4. Load the roster.
    let broadcaster = Broadcaster::new(config.sync.queue_capacity);
    let api = MutationApi::load(
        store.clone(),
        broadcaster,
        config.sync.persist_timeout(),
    )
    .await
    .map_err(EngineError::from)?;
    let state = Arc::new(AppState::new(api));

    // 5. Serve.
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    dispatch_server::start_server(&server_config, state, shutdown_signal())
        .await
        .map_err(EngineError::from)?;

    // 6. Close the store.
    if let RosterStore::Postgres(pg) = &store {
        pg.close().await;
    }
    info!("dispatch-engine stopped");
    Ok(())
}

/// Load configuration from `dispatch-config.yaml`.
///
/// If the file does not exist, defaults are used (environment overrides
/// still apply).
fn load_config() -> Result<DispatchConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(DispatchConfig::from_file(config_path)?)
    } else {
        Ok(DispatchConfig::parse("{}")?)
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(config: &DispatchConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Build the configured store.
async fn open_store(config: &DispatchConfig) -> Result<RosterStore, EngineError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let statuses = config.seed_catalog();
            info!(statuses = statuses.len(), "Seeding in-memory store");
            Ok(MemoryStore::with_data(RosterData {
                statuses,
                ..RosterData::default()
            })
            .into())
        }
        StorageBackend::Postgres => {
            let url = config.storage.postgres_url.as_deref().unwrap_or_default();
            let pg_config =
                PostgresConfig::new(url).with_max_connections(config.storage.max_connections);
            let store = PgRosterStore::connect(&pg_config).await?;
            if config.storage.run_migrations {
                store.run_migrations().await?;
                info!("Migrations applied");
            }
            Ok(store.into())
        }
    }
}

/// Resolve on `Ctrl-C`.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
