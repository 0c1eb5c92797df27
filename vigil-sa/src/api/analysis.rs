//! Analysis run API handlers
//!
//! POST /analysis/start, GET /analysis/status, POST /analysis/cancel

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{RunSession, RunState};
use crate::AppState;

/// POST /analysis/start response
#[derive(Debug, Serialize)]
pub struct StartAnalysisResponse {
    pub run_id: Uuid,
    pub state: RunState,
}

/// GET /analysis/status response
#[derive(Debug, Serialize)]
pub struct AnalysisStatusResponse {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub elapsed_seconds: f64,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /analysis/cancel response
#[derive(Debug, Serialize)]
pub struct CancelAnalysisResponse {
    pub cancelled: bool,
}

/// POST /analysis/start
///
/// Kicks off a background analysis run. Returns 202 with the run id,
/// or 409 when a run is already active.
pub async fn start_analysis(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<StartAnalysisResponse>)> {
    let orchestrator = state.orchestrator()?;
    let run_id = orchestrator.spawn_run()?;

    tracing::info!(run_id = %run_id, "Analysis run accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(StartAnalysisResponse {
            run_id,
            state: RunState::Analyzing,
        }),
    ))
}

/// GET /analysis/status
///
/// Status of the most recent run, active or finished. 404 before the
/// first run has ever started.
pub async fn analysis_status(
    State(state): State<AppState>,
) -> ApiResult<Json<AnalysisStatusResponse>> {
    let orchestrator = state.orchestrator()?;
    let session: RunSession = orchestrator
        .last_run()
        .await
        .ok_or_else(|| ApiError::NotFound("No analysis run has started yet".to_string()))?;

    Ok(Json(AnalysisStatusResponse {
        run_id: session.run_id,
        state: session.state,
        started_at: session.started_at,
        finished_at: session.finished_at,
        elapsed_seconds: session.duration_seconds(),
        warnings: session.warnings.clone(),
        error: session.error.clone(),
    }))
}

/// POST /analysis/cancel
///
/// Requests cancellation of the active run. 409 when no run is active.
pub async fn cancel_analysis(
    State(state): State<AppState>,
) -> ApiResult<Json<CancelAnalysisResponse>> {
    let orchestrator = state.orchestrator()?;
    if !orchestrator.cancel_active_run() {
        return Err(ApiError::Conflict(
            "No analysis run is currently active".to_string(),
        ));
    }

    tracing::info!("Cancellation requested for active analysis run");
    Ok(Json(CancelAnalysisResponse { cancelled: true }))
}

/// Build analysis run routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis/start", post(start_analysis))
        .route("/analysis/status", get(analysis_status))
        .route("/analysis/cancel", post(cancel_analysis))
}
