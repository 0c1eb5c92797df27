//! Report analyzer
//!
//! Reads field report documents from the configured directory and turns
//! each into a structured [`ReportFinding`]. Failures are per-document:
//! an unreadable file or a dead backend call becomes a failure record,
//! never a batch-level error, so one bad report cannot sink the others.

use crate::analyzers::{truncate_raw, AnalyzerError};
use crate::model::{
    extract_json_block, generate_with_retry, ModelBackend, ModelRequest, RetryPolicy,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use vigil_common::types::{clamp_confidence, ReportFinding};

/// Confidence assigned when model output could not be parsed
const FALLBACK_CONFIDENCE: f32 = 0.2;

const REPORT_EXTENSIONS: &[&str] = &["txt", "md"];

const REPORT_SCHEMA: &str = r#"{
  "zone_id": "zone name or null if event-wide",
  "summary": "string",
  "priority_issues": ["string"],
  "resource_status": {"resource_name": "status description"},
  "confidence": 0.0
}"#;

/// Lenient decode target for the report model's JSON
#[derive(Debug, Deserialize)]
struct RawReportResponse {
    #[serde(default, alias = "zone")]
    zone_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    priority_issues: Vec<String>,
    #[serde(default)]
    resource_status: BTreeMap<String, String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// One document the batch could not process
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    /// Document file name
    pub document: String,
    /// Why it failed
    pub reason: String,
}

/// Outcome of analyzing a reports directory
#[derive(Debug, Default)]
pub struct ReportBatch {
    pub findings: Vec<ReportFinding>,
    pub failures: Vec<DocumentFailure>,
}

pub struct ReportAnalyzer {
    backend: Arc<dyn ModelBackend>,
    retry: RetryPolicy,
}

impl ReportAnalyzer {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    /// Analyze every report document in a directory
    ///
    /// A missing or empty directory yields an empty batch. Ordering is
    /// deterministic (sorted by file name).
    pub async fn analyze_reports(&self, reports_dir: &Path, known_zones: &[String]) -> ReportBatch {
        let mut batch = ReportBatch::default();

        let documents = list_report_files(reports_dir);
        if documents.is_empty() {
            tracing::warn!(
                reports_dir = %reports_dir.display(),
                "No report documents found"
            );
            return batch;
        }

        for path in documents {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let text = match tokio::fs::read_to_string(&path).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(document = %name, error = %e, "Failed to read report document");
                    batch.failures.push(DocumentFailure {
                        document: name,
                        reason: format!("read_failed: {}", e),
                    });
                    continue;
                }
            };

            if text.trim().is_empty() {
                batch.failures.push(DocumentFailure {
                    document: name,
                    reason: "empty_document".to_string(),
                });
                continue;
            }

            match self.analyze_document(&name, &text, known_zones).await {
                Ok(finding) => batch.findings.push(finding),
                Err(e) => {
                    tracing::warn!(document = %name, error = %e, "Report analysis failed");
                    batch.failures.push(DocumentFailure {
                        document: name,
                        reason: e.degrade_reason(),
                    });
                }
            }
        }

        tracing::info!(
            findings = batch.findings.len(),
            failures = batch.failures.len(),
            "Report batch completed"
        );
        batch
    }

    async fn analyze_document(
        &self,
        name: &str,
        text: &str,
        known_zones: &[String],
    ) -> Result<ReportFinding, AnalyzerError> {
        let prompt = build_report_prompt(text, known_zones);
        let request = ModelRequest::text(prompt).with_schema(REPORT_SCHEMA);

        let raw = generate_with_retry(self.backend.as_ref(), &request, &self.retry).await?;
        Ok(parse_report_response(name, &raw, known_zones))
    }
}

/// Number of report documents currently in a directory
pub fn count_report_documents(dir: &Path) -> usize {
    list_report_files(dir).len()
}

fn list_report_files(dir: &Path) -> Vec<std::path::PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<std::path::PathBuf> = walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| REPORT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    files
}

fn build_report_prompt(text: &str, known_zones: &[String]) -> String {
    format!(
        "You are a field operations analyst for a live event. The monitored zones are: {}. \
         Extract the key information from this field report. If the report is about one of the \
         monitored zones, name it exactly; if it applies to the whole event, use null for \
         zone_id. Respond with a single JSON object only.\n\nReport:\n{}",
        known_zones.join(", "),
        text
    )
}

/// Match a model-reported zone name against the monitored zone list
///
/// Case-insensitive; unmatched names become event-wide (None) rather
/// than inventing zones the snapshot does not track.
fn canonical_zone(reported: Option<&str>, known_zones: &[String]) -> Option<String> {
    let reported = reported?.trim();
    if reported.is_empty() || reported.eq_ignore_ascii_case("null") {
        return None;
    }
    known_zones
        .iter()
        .find(|z| z.eq_ignore_ascii_case(reported))
        .cloned()
}

fn parse_report_response(name: &str, raw: &str, known_zones: &[String]) -> ReportFinding {
    let parsed = extract_json_block(raw)
        .and_then(|block| serde_json::from_str::<RawReportResponse>(block).ok());

    match parsed {
        Some(r) => ReportFinding {
            zone_id: canonical_zone(r.zone_id.as_deref(), known_zones),
            summary: r
                .summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("Report {} (no summary extracted)", name)),
            priority_issues: r.priority_issues,
            resource_status: r.resource_status,
            confidence: clamp_confidence(r.confidence),
            timestamp: Utc::now(),
        },
        None => {
            tracing::warn!(
                document = %name,
                raw_len = raw.len(),
                "Report response was not valid JSON, using fallback finding"
            );
            ReportFinding {
                zone_id: None,
                summary: format!("Unparsed report analysis: {}", truncate_raw(raw, 200)),
                priority_issues: Vec::new(),
                resource_status: BTreeMap::new(),
                confidence: FALLBACK_CONFIDENCE,
                timestamp: Utc::now(),
            }
        }
    }
}
