// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only surface over the dashboard snapshot. No authentication.
//
// CORS is configured permissively so browser dashboards on any origin can
// poll the service.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::dashboard::DashboardState;
use crate::market::CacheStats;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST API router with CORS middleware and shared state.
pub fn router(state: Arc<DashboardState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Dashboard
// =============================================================================

async fn dashboard(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    Json(state.snapshot())
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitHealth {
    remaining: u32,
    /// Configured calls per window.
    limit: u32,
    reset_time: i64,
    remaining_time: i64,
    last_updated: Option<String>,
    window: String,
}

#[derive(Serialize)]
struct CacheHealth {
    keys: usize,
    stats: CacheStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: f64,
    timestamp: String,
    updates: u64,
    rate_limit: RateLimitHealth,
    cache: CacheHealth,
}

fn health_report(state: &DashboardState) -> HealthResponse {
    let rate = state.tracker.snapshot();
    let stats = state.cache.stats();

    HealthResponse {
        status: "ok",
        uptime_secs: state.uptime().as_secs_f64(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        updates: state
            .update_count
            .load(std::sync::atomic::Ordering::Relaxed),
        rate_limit: RateLimitHealth {
            remaining: rate.remaining,
            limit: state.config.coingecko.effective_rate_limit(),
            reset_time: rate.reset_time,
            remaining_time: rate.remaining_time,
            last_updated: rate.last_updated,
            window: format!("{}s", state.config.coingecko.rate_limit_window_secs),
        },
        cache: CacheHealth {
            keys: stats.keys,
            stats,
        },
    }
}

async fn health(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    Json(health_report(&state))
}
