//! screener-web service entry point.

use anyhow::Result;
use screener_common::config::Config;
use screener_common::logging::init_logging;
use screener_web::{build_router, AppState};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Screener Web v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::from_config(&config)?;
    tracing::info!(endpoint = %state.fetcher.endpoint(), "Using screener endpoint");

    let app = build_router(state);
    let addr: SocketAddr = config.bind_address().parse()?;

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
