//! Snapshot API handlers
//!
//! GET /snapshot, GET /snapshot/zones/{zone_id}

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use vigil_common::types::{SituationSnapshot, ZoneView};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /snapshot
///
/// The currently published snapshot. 404 until the first run completes.
pub async fn get_snapshot(State(state): State<AppState>) -> ApiResult<Json<SituationSnapshot>> {
    let orchestrator = state.orchestrator()?;
    let snapshot = orchestrator.snapshot().await.ok_or_else(|| {
        ApiError::NotFound("No snapshot has been published yet".to_string())
    })?;
    Ok(Json((*snapshot).clone()))
}

/// GET /snapshot/zones/{zone_id} response
#[derive(Debug, Serialize)]
pub struct ZoneDetailResponse {
    pub zone_id: String,
    #[serde(flatten)]
    pub view: ZoneView,
    /// Degradation reason when the zone failed this run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub snapshot_generated_at: chrono::DateTime<chrono::Utc>,
}

/// GET /snapshot/zones/{zone_id}
///
/// Single-zone view; matches zone names case-insensitively. 404 when
/// the zone is in neither the snapshot nor the degraded set.
pub async fn get_zone_detail(
    State(state): State<AppState>,
    Path(zone_id): Path<String>,
) -> ApiResult<Json<ZoneDetailResponse>> {
    let orchestrator = state.orchestrator()?;
    let snapshot = orchestrator.snapshot().await.ok_or_else(|| {
        ApiError::NotFound("No snapshot has been published yet".to_string())
    })?;

    let canonical = snapshot
        .zones
        .keys()
        .find(|z| z.eq_ignore_ascii_case(&zone_id))
        .cloned();

    match canonical {
        Some(canonical) => {
            let view = snapshot.zones[&canonical].clone();
            let degraded_reason = snapshot.degraded_zones.get(&canonical).cloned();
            Ok(Json(ZoneDetailResponse {
                zone_id: canonical,
                view,
                degraded_reason,
                snapshot_generated_at: snapshot.generated_at,
            }))
        }
        None => {
            // A zone can be degraded without appearing in zones at all
            if let Some((canonical, reason)) = snapshot
                .degraded_zones
                .iter()
                .find(|(z, _)| z.eq_ignore_ascii_case(&zone_id))
            {
                return Ok(Json(ZoneDetailResponse {
                    zone_id: canonical.clone(),
                    view: ZoneView {
                        assessment: None,
                        finding: None,
                        discrepancies: Vec::new(),
                        recommended_actions: Vec::new(),
                        threat_level: vigil_common::types::ThreatLevel::Moderate,
                    },
                    degraded_reason: Some(reason.clone()),
                    snapshot_generated_at: snapshot.generated_at,
                }));
            }
            Err(ApiError::NotFound(format!("Unknown zone: {}", zone_id)))
        }
    }
}

/// Build snapshot routes
pub fn snapshot_routes() -> Router<AppState> {
    Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/snapshot/zones/:zone_id", get(get_zone_detail))
}
