//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok" or "degraded")
    pub status: String,
    /// Module name ("vigil-sa")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Whether a model API key is configured
    pub model_configured: bool,
    /// Number of monitored zones
    pub zone_count: usize,
}

/// GET /health
///
/// "degraded" means the service is up but cannot run analyses because
/// no model API key is configured.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model_configured = state.model_available();
    let status = if model_configured { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "vigil-sa".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model_configured,
        zone_count: state.config.zones.len(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
