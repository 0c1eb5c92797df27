//! Analysis orchestrator
//!
//! Drives one analysis run end to end: samples frames per zone, runs
//! the vision and report analyzers concurrently, fuses their outputs,
//! and publishes the resulting snapshot atomically. At most one run is
//! active at a time; readers always see the previously published
//! snapshot until the swap.
//!
//! A zone whose vision analysis fails degrades the run instead of
//! aborting it. The run only fails outright when neither modality
//! produced any usable input, and a failed or cancelled run never
//! touches the published snapshot.

use crate::analyzers::report::ReportAnalyzer;
use crate::analyzers::vision::VisionAnalyzer;
use crate::fusion::SnapshotFuser;
use crate::models::{RunSession, RunState};
use crate::sampler::{discover_zone_sources, FrameSource, ZoneSource};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vigil_common::events::{EventBus, VigilEvent};
use vigil_common::types::{SituationSnapshot, ZoneAssessment};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Another analysis run is already active
    #[error("An analysis run is already in progress")]
    RunInProgress,

    /// Neither modality produced any usable input
    #[error("No usable input: no frames were analyzed and no report findings were extracted")]
    NoUsableInput,

    /// The run was cancelled before publishing
    #[error("Analysis run was cancelled")]
    Cancelled,
}

/// Outcome of one zone's vision pass
enum ZoneOutcome {
    Analyzed {
        assessment: ZoneAssessment,
        frames_analyzed: usize,
    },
    Degraded {
        zone_id: String,
        reason: String,
    },
    Cancelled,
}

pub struct Orchestrator {
    vision: VisionAnalyzer,
    reports: ReportAnalyzer,
    sampler: Arc<dyn FrameSource>,
    frames_dir: PathBuf,
    reports_dir: PathBuf,
    zones: Vec<String>,
    event_bus: EventBus,
    /// Single-run gate; try_lock failure means a run is active
    run_gate: Arc<Mutex<()>>,
    /// The atomically swapped published snapshot
    published: RwLock<Option<Arc<SituationSnapshot>>>,
    /// Most recent run (current or finished)
    last_run: RwLock<Option<RunSession>>,
    /// Cancellation token for the active run
    cancel: std::sync::Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        vision: VisionAnalyzer,
        reports: ReportAnalyzer,
        sampler: Arc<dyn FrameSource>,
        frames_dir: PathBuf,
        reports_dir: PathBuf,
        zones: Vec<String>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            vision,
            reports,
            sampler,
            frames_dir,
            reports_dir,
            zones,
            event_bus,
            run_gate: Arc::new(Mutex::new(())),
            published: RwLock::new(None),
            last_run: RwLock::new(None),
            cancel: std::sync::Mutex::new(None),
        }
    }

    /// Currently published snapshot, if any run has completed yet
    pub async fn snapshot(&self) -> Option<Arc<SituationSnapshot>> {
        self.published.read().await.clone()
    }

    /// Most recent run session (active or finished)
    pub async fn last_run(&self) -> Option<RunSession> {
        self.last_run.read().await.clone()
    }

    /// Start a run in the background, returning its id immediately
    pub fn spawn_run(self: &Arc<Self>) -> Result<Uuid, OrchestratorError> {
        let guard = self
            .run_gate
            .clone()
            .try_lock_owned()
            .map_err(|_| OrchestratorError::RunInProgress)?;

        let orchestrator = self.clone();
        let run_id = Uuid::new_v4();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute_run(run_id, guard).await {
                tracing::warn!(run_id = %run_id, error = %e, "Analysis run did not publish");
            }
        });
        Ok(run_id)
    }

    /// Run an analysis to completion on the current task
    pub async fn run_analysis(&self) -> Result<Arc<SituationSnapshot>, OrchestratorError> {
        let guard = self
            .run_gate
            .clone()
            .try_lock_owned()
            .map_err(|_| OrchestratorError::RunInProgress)?;
        self.execute_run(Uuid::new_v4(), guard).await
    }

    /// Request cancellation of the active run, if any
    pub fn cancel_active_run(&self) -> bool {
        let slot = match self.cancel.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn execute_run(
        &self,
        run_id: Uuid,
        _guard: OwnedMutexGuard<()>,
    ) -> Result<Arc<SituationSnapshot>, OrchestratorError> {
        let token = CancellationToken::new();
        {
            let mut slot = match self.cancel.lock() {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(token.clone());
        }

        let mut session = RunSession::new();
        session.run_id = run_id;
        *self.last_run.write().await = Some(session.clone());

        let result = self.run_pipeline(&mut session, &token).await;

        {
            let mut slot = match self.cancel.lock() {
                Ok(s) => s,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = None;
        }

        match &result {
            Ok(_) => {
                session.transition_to(RunState::Completed);
                self.event_bus.emit_lossy(VigilEvent::AnalysisRunCompleted {
                    run_id,
                    duration_seconds: session.duration_seconds() as u64,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(OrchestratorError::Cancelled) => {
                session.transition_to(RunState::Cancelled);
                self.event_bus.emit_lossy(VigilEvent::AnalysisRunCancelled {
                    run_id,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                session.fail(e.to_string());
                self.event_bus.emit_lossy(VigilEvent::AnalysisRunFailed {
                    run_id,
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        *self.last_run.write().await = Some(session);
        result
    }

    async fn run_pipeline(
        &self,
        session: &mut RunSession,
        token: &CancellationToken,
    ) -> Result<Arc<SituationSnapshot>, OrchestratorError> {
        let run_id = session.run_id;
        let sources = discover_zone_sources(&self.frames_dir, &self.zones);
        let document_count = crate::analyzers::report::count_report_documents(&self.reports_dir);

        tracing::info!(
            run_id = %run_id,
            zones = sources.len(),
            documents = document_count,
            "Analysis run started"
        );
        self.event_bus.emit_lossy(VigilEvent::AnalysisRunStarted {
            run_id,
            zone_count: sources.len(),
            document_count,
            timestamp: chrono::Utc::now(),
        });

        // Vision (all zones concurrently) and reports run in parallel
        let vision_pass = futures::future::join_all(
            sources
                .iter()
                .map(|source| self.analyze_one_zone(source, token)),
        );
        let report_pass = async {
            tokio::select! {
                batch = self.reports.analyze_reports(&self.reports_dir, &self.zones) => Some(batch),
                _ = token.cancelled() => None,
            }
        };
        let (zone_outcomes, report_batch) = tokio::join!(vision_pass, report_pass);

        let Some(report_batch) = report_batch else {
            return Err(OrchestratorError::Cancelled);
        };

        let mut assessments = Vec::new();
        let mut degraded = BTreeMap::new();
        let mut frames_total = 0usize;

        for outcome in zone_outcomes {
            match outcome {
                ZoneOutcome::Analyzed {
                    assessment,
                    frames_analyzed,
                } => {
                    frames_total += frames_analyzed;
                    self.event_bus.emit_lossy(VigilEvent::ZoneAnalyzed {
                        run_id,
                        zone_id: assessment.zone_id.clone(),
                        frames_analyzed,
                        timestamp: chrono::Utc::now(),
                    });
                    assessments.push(assessment);
                }
                ZoneOutcome::Degraded { zone_id, reason } => {
                    session.add_warning(format!("{}: {}", zone_id, reason));
                    self.event_bus.emit_lossy(VigilEvent::ZoneDegraded {
                        run_id,
                        zone_id: zone_id.clone(),
                        reason: reason.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                    degraded.insert(zone_id, reason);
                }
                ZoneOutcome::Cancelled => return Err(OrchestratorError::Cancelled),
            }
        }

        for failure in &report_batch.failures {
            session.add_warning(format!("{}: {}", failure.document, failure.reason));
        }
        self.event_bus.emit_lossy(VigilEvent::ReportsAnalyzed {
            run_id,
            findings: report_batch.findings.len(),
            failed_documents: report_batch.failures.len(),
            timestamp: chrono::Utc::now(),
        });

        // A run with no frames anywhere and no findings has nothing to
        // say; the previously published snapshot stays current.
        if frames_total == 0 && report_batch.findings.is_empty() {
            return Err(OrchestratorError::NoUsableInput);
        }

        session.transition_to(RunState::Fusing);
        {
            *self.last_run.write().await = Some(session.clone());
        }

        let snapshot = SnapshotFuser::fuse(assessments, report_batch.findings, degraded);

        // Last cancellation check before the publish point
        if token.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let snapshot = Arc::new(snapshot);
        *self.published.write().await = Some(snapshot.clone());

        tracing::info!(
            run_id = %run_id,
            overall_threat = snapshot.overall_threat_level.as_str(),
            confidence = snapshot.confidence,
            zones = snapshot.zones.len(),
            degraded = snapshot.degraded_zones.len(),
            "Snapshot published"
        );
        self.event_bus.emit_lossy(VigilEvent::SnapshotPublished {
            run_id,
            overall_threat_level: snapshot.overall_threat_level,
            confidence: snapshot.confidence,
            zone_count: snapshot.zones.len(),
            timestamp: chrono::Utc::now(),
        });

        Ok(snapshot)
    }

    async fn analyze_one_zone(&self, source: &ZoneSource, token: &CancellationToken) -> ZoneOutcome {
        let frames = {
            let sampler = self.sampler.clone();
            let source = source.clone();
            tokio::task::spawn_blocking(move || sampler.sample(&source))
                .await
                .unwrap_or_default()
        };
        let frames_analyzed = frames.len();

        let analysis = tokio::select! {
            result = self.vision.analyze_zone(&source.zone_id, &frames) => result,
            _ = token.cancelled() => return ZoneOutcome::Cancelled,
        };

        match analysis {
            Ok(assessment) => ZoneOutcome::Analyzed {
                assessment,
                frames_analyzed,
            },
            Err(e) => {
                tracing::warn!(
                    zone_id = %source.zone_id,
                    error = %e,
                    "Zone degraded"
                );
                ZoneOutcome::Degraded {
                    zone_id: source.zone_id.clone(),
                    reason: e.degrade_reason(),
                }
            }
        }
    }
}
