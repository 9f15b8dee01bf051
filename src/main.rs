use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_dispatch::api;
use delivery_dispatch::config::Config;
use delivery_dispatch::engine::dispatch::run_dispatch_engine;
use delivery_dispatch::engine::sweep::run_redispatch_sweep;
use delivery_dispatch::error::AppError;
use delivery_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let sweep_interval = config.sweep_interval();
    let (app_state, dispatch_rx) = AppState::new(config.clone());
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_dispatch_engine(shared_state.clone(), dispatch_rx));
    tokio::spawn(run_redispatch_sweep(shared_state.clone(), sweep_interval));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
