//! Analysis run session state
//!
//! Tracks one analysis run's lifecycle for the status endpoint and the
//! run-in-progress guard. State transitions are validated; invalid ones
//! are logged and rejected so the session can never skip backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Analyzers are working (vision and reports, concurrently)
    Analyzing,
    /// Analyzer outputs are being fused into a snapshot
    Fusing,
    /// Snapshot published
    Completed,
    /// Run was cancelled before publishing
    Cancelled,
    /// Run failed before publishing
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }

    /// Valid successor states
    fn can_transition_to(&self, next: RunState) -> bool {
        match self {
            RunState::Analyzing => matches!(
                next,
                RunState::Fusing | RunState::Cancelled | RunState::Failed
            ),
            RunState::Fusing => matches!(
                next,
                RunState::Completed | RunState::Cancelled | RunState::Failed
            ),
            _ => false,
        }
    }
}

/// One analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Non-fatal problems encountered during the run
    pub warnings: Vec<String>,
    /// Failure reason when state is Failed
    pub error: Option<String>,
}

impl RunSession {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Analyzing,
            started_at: Utc::now(),
            finished_at: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Attempt a state transition, returning false if invalid
    pub fn transition_to(&mut self, next: RunState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                run_id = %self.run_id,
                from = ?self.state,
                to = ?next,
                "Rejected invalid run state transition"
            );
            return false;
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.error = Some(reason.clone());
        if !self.transition_to(RunState::Failed) {
            // Already terminal; keep the recorded reason
            tracing::warn!(run_id = %self.run_id, reason = %reason, "fail() on terminal run");
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for RunSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut session = RunSession::new();
        assert!(session.transition_to(RunState::Fusing));
        assert!(session.transition_to(RunState::Completed));
        assert!(session.state.is_terminal());
        assert!(session.finished_at.is_some());
    }

    #[test]
    fn test_cannot_leave_terminal_state() {
        let mut session = RunSession::new();
        assert!(session.transition_to(RunState::Cancelled));
        assert!(!session.transition_to(RunState::Fusing));
        assert_eq!(session.state, RunState::Cancelled);
    }

    #[test]
    fn test_cannot_skip_to_completed_from_analyzing() {
        let mut session = RunSession::new();
        assert!(!session.transition_to(RunState::Completed));
        assert_eq!(session.state, RunState::Analyzing);
    }

    #[test]
    fn test_fail_records_reason() {
        let mut session = RunSession::new();
        session.fail("no usable input");
        assert_eq!(session.state, RunState::Failed);
        assert_eq!(session.error.as_deref(), Some("no usable input"));
    }
}
