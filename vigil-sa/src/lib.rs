//! Vigil Situational Awareness service
//!
//! Multi-agent analysis pipeline for live event monitoring: per-zone
//! video frames and field report documents are analyzed concurrently,
//! fused into a single situation snapshot, and served over a small REST
//! surface with SSE event streaming and a snapshot-grounded query
//! endpoint.

pub mod analyzers;
pub mod api;
pub mod error;
pub mod fusion;
pub mod model;
pub mod models;
pub mod orchestrator;
pub mod query;
pub mod sampler;

use crate::analyzers::report::ReportAnalyzer;
use crate::analyzers::vision::VisionAnalyzer;
use crate::model::ModelBackend;
use crate::orchestrator::Orchestrator;
use crate::query::QueryEngine;
use crate::sampler::StillFrameSampler;
use std::sync::Arc;
use std::time::Instant;
use vigil_common::config::VigilConfig;
use vigil_common::events::EventBus;

/// Event bus capacity; slow SSE subscribers miss events past this
const EVENT_BUS_CAPACITY: usize = 256;

/// Shared application state for all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Analysis engines; None when no model API key is configured
    engines: Option<Engines>,
    pub event_bus: EventBus,
    pub config: Arc<VigilConfig>,
    pub started_at: Instant,
}

#[derive(Clone)]
struct Engines {
    orchestrator: Arc<Orchestrator>,
    query: Arc<QueryEngine>,
}

impl AppState {
    /// Build state with a model backend (normal operation)
    pub fn new(config: VigilConfig, backend: Arc<dyn ModelBackend>) -> Self {
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

        let sampler = Arc::new(StillFrameSampler::new(config.max_frames_per_zone));
        let orchestrator = Arc::new(Orchestrator::new(
            VisionAnalyzer::new(backend.clone()),
            ReportAnalyzer::new(backend.clone()),
            sampler,
            config.frames_dir.clone(),
            config.reports_dir.clone(),
            config.zones.clone(),
            event_bus.clone(),
        ));
        let query = Arc::new(QueryEngine::new(backend));

        Self {
            engines: Some(Engines {
                orchestrator,
                query,
            }),
            event_bus,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    /// Build state without a model backend
    ///
    /// The service still serves health and event endpoints; analysis
    /// and query endpoints answer 503 until a key is configured.
    pub fn without_backend(config: VigilConfig) -> Self {
        Self {
            engines: None,
            event_bus: EventBus::new(EVENT_BUS_CAPACITY),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    pub fn model_available(&self) -> bool {
        self.engines.is_some()
    }

    pub(crate) fn orchestrator(&self) -> Result<&Arc<Orchestrator>, error::ApiError> {
        self.engines
            .as_ref()
            .map(|e| &e.orchestrator)
            .ok_or_else(|| {
                error::ApiError::Unavailable(
                    "No model API key is configured; analysis is disabled".to_string(),
                )
            })
    }

    pub(crate) fn query_engine(&self) -> Result<&Arc<QueryEngine>, error::ApiError> {
        self.engines.as_ref().map(|e| &e.query).ok_or_else(|| {
            error::ApiError::Unavailable(
                "No model API key is configured; queries are disabled".to_string(),
            )
        })
    }
}
