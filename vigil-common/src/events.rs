//! Event types and EventBus for the Vigil system
//!
//! Events are broadcast via the EventBus and serialized for SSE
//! transmission to connected dashboard clients. All events use this
//! central enum for type safety and exhaustive matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::ThreatLevel;

/// Vigil event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VigilEvent {
    /// An analysis run started
    AnalysisRunStarted {
        /// Run identifier
        run_id: Uuid,
        /// Number of zone sources in this run
        zone_count: usize,
        /// Number of report documents in this run
        document_count: usize,
        /// When the run started
        timestamp: DateTime<Utc>,
    },

    /// A zone's vision analysis finished successfully
    ZoneAnalyzed {
        run_id: Uuid,
        zone_id: String,
        /// Frames that were sampled for this zone
        frames_analyzed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A zone's analysis failed; the run continues without it
    ZoneDegraded {
        run_id: Uuid,
        zone_id: String,
        /// Human-readable failure reason
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Field report analysis finished
    ReportsAnalyzed {
        run_id: Uuid,
        /// Findings successfully extracted
        findings: usize,
        /// Documents that failed to be analyzed
        failed_documents: usize,
        timestamp: DateTime<Utc>,
    },

    /// A new snapshot was published
    SnapshotPublished {
        run_id: Uuid,
        overall_threat_level: ThreatLevel,
        confidence: f32,
        zone_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Analysis run finished successfully
    AnalysisRunCompleted {
        run_id: Uuid,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Analysis run failed as a whole (e.g., no usable input)
    AnalysisRunFailed {
        run_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Analysis run was cancelled by the caller
    AnalysisRunCancelled {
        run_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl VigilEvent {
    /// Event type name for SSE event framing
    pub fn event_type(&self) -> &'static str {
        match self {
            VigilEvent::AnalysisRunStarted { .. } => "AnalysisRunStarted",
            VigilEvent::ZoneAnalyzed { .. } => "ZoneAnalyzed",
            VigilEvent::ZoneDegraded { .. } => "ZoneDegraded",
            VigilEvent::ReportsAnalyzed { .. } => "ReportsAnalyzed",
            VigilEvent::SnapshotPublished { .. } => "SnapshotPublished",
            VigilEvent::AnalysisRunCompleted { .. } => "AnalysisRunCompleted",
            VigilEvent::AnalysisRunFailed { .. } => "AnalysisRunFailed",
            VigilEvent::AnalysisRunCancelled { .. } => "AnalysisRunCancelled",
        }
    }
}

/// Central event distribution bus
///
/// Backed by `tokio::sync::broadcast`: non-blocking publish, multiple
/// concurrent subscribers, automatic cleanup when subscribers drop.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VigilEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<VigilEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    ///
    /// Progress events are advisory; the analysis run must not fail just
    /// because nobody is watching the SSE stream.
    pub fn emit_lossy(&self, event: VigilEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
