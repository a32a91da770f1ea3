//! Startup helpers for the canon-fusion server.
//!
//! Configuration comes from an optional JSON file named by `CANON_FUSION_CONFIG`,
//! with `CANON_FUSION_DB` and `CANON_FUSION_PORT` overrides.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::retrieval::core::config::EngineConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::server::{self, AppState};

/// Run the server (used by the `canon-fusion-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting canon-fusion v{}", env!("CARGO_PKG_VERSION"));

    match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Load the configuration, build the state and serve until shutdown.
fn serve() -> Result<(), String> {
    let config = load_config().map_err(|e| format!("Invalid configuration: {e}"))?;
    let port = get_port(&config);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {e}"))?;
    let state = rt
        .block_on(initialize(config))
        .map_err(|e| format!("Failed to create state: {e}"))?;

    rt.block_on(server::run_server_with_shutdown(state, port, shutdown_signal()))
        .map_err(|e| format!("Server error: {e}"))
}

/// Load the engine configuration from the environment.
///
/// # Errors
/// Returns an error if the configuration file cannot be read or fails validation.
pub fn load_config() -> RetrievalResult<EngineConfig> {
    let mut config = match std::env::var("CANON_FUSION_CONFIG") {
        Ok(path) => {
            tracing::info!(%path, "loading configuration");
            EngineConfig::from_json_file(&PathBuf::from(path))?
        }
        Err(_) => EngineConfig::default(),
    };

    if let Ok(path) = std::env::var("CANON_FUSION_DB") {
        config.storage.sqlite_path = PathBuf::from(path);
    }
    config.validate()?;
    Ok(config)
}

/// Build application state without starting the server.
///
/// # Errors
/// Returns an error if the pipeline cannot be created.
pub async fn initialize(config: EngineConfig) -> RetrievalResult<Arc<AppState>> {
    tracing::info!(db = %config.storage.sqlite_path.display(), "opening corpus");
    AppState::from_config(config).await
}

/// Get configured server port; `CANON_FUSION_PORT` wins over the config file.
#[must_use]
pub fn get_port(config: &EngineConfig) -> u16 {
    std::env::var("CANON_FUSION_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.server.port)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
