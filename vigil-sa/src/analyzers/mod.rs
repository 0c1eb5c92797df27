//! Analysis agents
//!
//! Each analyzer wraps the shared model backend behind a domain-specific
//! surface: the vision analyzer turns sampled frames into per-zone
//! crowd assessments, the report analyzer turns field report documents
//! into structured findings. Both degrade to explicit low-confidence
//! fallbacks on malformed model output; only backend failures surface
//! as errors.

pub mod report;
pub mod vision;

use crate::model::ModelError;
use thiserror::Error;

/// Analyzer failure (backend-level; parse problems never reach here)
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Model request failed: {0}")]
    Model(#[from] ModelError),
}

impl AnalyzerError {
    /// Short machine-readable reason used in degraded-zone records
    pub fn degrade_reason(&self) -> String {
        match self {
            AnalyzerError::Model(ModelError::Timeout) => "model_timeout".to_string(),
            AnalyzerError::Model(ModelError::QuotaExceeded(_)) => {
                "model_quota_exceeded".to_string()
            }
            AnalyzerError::Model(ModelError::Auth(_)) => "model_auth_failure".to_string(),
            AnalyzerError::Model(e) => format!("model_error: {}", e),
        }
    }
}

/// Truncate raw model text for embedding in fallback records
pub(crate) fn truncate_raw(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrade_reason_for_timeout() {
        let err = AnalyzerError::Model(ModelError::Timeout);
        assert_eq!(err.degrade_reason(), "model_timeout");
    }

    #[test]
    fn test_truncate_raw_short_text_unchanged() {
        assert_eq!(truncate_raw("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_raw_long_text() {
        let out = truncate_raw("abcdefghij", 4);
        assert_eq!(out, "abcd...");
    }
}
