//! Service entry point: configuration, logging, state wiring, serving.

use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use calbridge_api::{router, state::AppState};
use calbridge_infra::config;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // The subscriber may not be installed yet when startup fails.
        eprintln!("fatal: {err}");
        error!(error = %err, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run() -> calbridge_domain::Result<()> {
    let config = config::load_from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(environment = ?config.environment, port = config.server.port, "starting calbridge");

    let port = config.server.port;
    let state = AppState::build(config)?;

    // Background workers: garbage collection and periodic sync.
    tokio::spawn(state.sweeper.clone().run());
    tokio::spawn(state.scheduler.clone().run());

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| calbridge_domain::CalbridgeError::Config(format!("bind failed: {e}")))?;

    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| calbridge_domain::CalbridgeError::Internal(format!("server error: {e}")))?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install shutdown signal handler");
    }
}
