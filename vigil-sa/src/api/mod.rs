//! HTTP API handlers for vigil-sa
//!
//! REST surface plus SSE event streaming. All handlers share
//! [`crate::AppState`]; routes are grouped per concern.

pub mod analysis;
pub mod health;
pub mod query;
pub mod snapshot;
pub mod sse;

pub use analysis::analysis_routes;
pub use health::health_routes;
pub use query::query_routes;
pub use snapshot::snapshot_routes;
pub use sse::event_stream;

use crate::AppState;
use axum::routing::get;
use axum::Router;

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(analysis_routes())
        .merge(snapshot_routes())
        .merge(query_routes())
        .merge(health_routes())
        .route("/events", get(event_stream))
        .with_state(state)
}
