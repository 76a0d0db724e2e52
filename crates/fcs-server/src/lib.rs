//! HTTP front end of the functional conformance suite.
//!
//! Wires one [`fcs_core::Journey`] into an axum router, pushes run results
//! over a WebSocket and serves report export/import.

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::app;
pub use state::AppState;

use fcs_core::version::VersionChecker;
use fcs_core::{Journey, JourneyDeps, RunPolicy};
use tracing::info;

/// Build state from `config`, bind and serve until Ctrl-C.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let policy = RunPolicy {
        timeout: config.run_timeout(),
        http_trace: config.log_http_trace,
    };
    let deps = JourneyDeps::with_settings(config.swagger_cache_size, config.http_timeout(), policy)?;
    let version = VersionChecker::new(
        env!("CARGO_PKG_VERSION"),
        &config.version_check_url,
        config.http_timeout(),
    )?;
    let state = AppState::new(Journey::new(deps), version).with_http_trace(config.log_http_trace);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "fcs-server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}
