// =============================================================================
// Market Pulse — Main Entry Point
// =============================================================================
//
// Polls CoinGecko, Yahoo Finance and the Fear & Greed index on a schedule,
// computes indicators and support/resistance levels for every tracked asset,
// and serves the latest snapshot over HTTP.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analysis;
mod api;
mod dashboard;
mod error;
mod indicators;
mod levels;
mod market;
mod runtime_config;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::dashboard::DashboardState;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "market_pulse.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Market Pulse starting up");

    let mut config = RuntimeConfig::load_or_init(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env();
    config
        .analysis
        .validate()
        .context("invalid analysis parameters in configuration")?;

    info!(
        coins = ?config.coins,
        equities = ?config.equities,
        update_interval_ms = config.update_interval_ms,
        coingecko = ?config.coingecko,
        "Configuration resolved"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(DashboardState::new(config)?);

    // ── 3. Refresh scheduler ─────────────────────────────────────────────
    tokio::spawn(dashboard::run_scheduler(state.clone()));

    // ── 4. REST API server ───────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping");
    server.abort();

    info!("Market Pulse shut down complete.");
    Ok(())
}
