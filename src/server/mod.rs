//! HTTP server layer
//!
//! # Modules
//!
//! - [`routes`]: Router and handlers for the project and stats endpoints
//! - [`state`]: `AppContext` shared by all handlers
//! - [`error`]: Mapping of handler failures to JSON error responses

pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::project::gate::ConcurrencyGate;
use crate::server::routes::create_router;
use crate::server::state::AppContext;

const LOG_FILE_PREFIX: &str = "etelemetry-server.log";

/// Install the global tracing subscriber.
///
/// Logs go to stderr, or to daily rolling JSON files under `log_dir`. The
/// returned guard must be held until shutdown so buffered lines are flushed.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

pub async fn run_server(config: Config, addr: SocketAddr) -> anyhow::Result<()> {
    info!("Starting etelemetry-server v{}", env!("CARGO_PKG_VERSION"));

    let context = Arc::new(AppContext::from_config(config)?);
    let gate = Arc::clone(&context.gate);
    let app = create_router(context);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(gate))
    .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, closing the gate so queued forge calls fail fast
async fn shutdown_signal(gate: Arc<ConcurrencyGate>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    gate.close();
}
