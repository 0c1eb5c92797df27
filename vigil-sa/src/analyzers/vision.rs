//! Vision analyzer
//!
//! Turns a zone's sampled frames into a [`ZoneAssessment`]. Malformed
//! model output degrades to a low-confidence fallback assessment with
//! the raw text preserved in the infrastructure notes; only backend
//! failures (after retry) surface as errors so the orchestrator can
//! mark the zone degraded.

use crate::analyzers::{truncate_raw, AnalyzerError};
use crate::model::{
    extract_json_block, generate_with_retry, ModelBackend, ModelRequest, RetryPolicy,
};
use crate::sampler::SampledFrame;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use vigil_common::types::{clamp_confidence, CrowdBehavior, CrowdDensity, ZoneAssessment};

/// Confidence assigned when model output could not be parsed
const FALLBACK_CONFIDENCE: f32 = 0.2;

const VISION_SCHEMA: &str = r#"{
  "crowd_density": "low | moderate | high | critical",
  "crowd_behavior": "calm | excited | restless | agitated",
  "risks": ["string"],
  "infrastructure_notes": ["string"],
  "confidence": 0.0
}"#;

/// Lenient decode target for the vision model's JSON
#[derive(Debug, Deserialize)]
struct RawVisionResponse {
    #[serde(default)]
    crowd_density: Option<String>,
    #[serde(default, alias = "behavior")]
    crowd_behavior: Option<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    infrastructure_notes: Vec<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct VisionAnalyzer {
    backend: Arc<dyn ModelBackend>,
    retry: RetryPolicy,
}

impl VisionAnalyzer {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    /// Assess one zone from its sampled frames
    ///
    /// Zero frames short-circuits to the empty-input sentinel without a
    /// model call.
    pub async fn analyze_zone(
        &self,
        zone_id: &str,
        frames: &[SampledFrame],
    ) -> Result<ZoneAssessment, AnalyzerError> {
        if frames.is_empty() {
            tracing::warn!(zone_id = %zone_id, "No frames for zone, recording empty-input assessment");
            return Ok(ZoneAssessment::empty_input(zone_id));
        }

        let prompt = build_vision_prompt(zone_id, frames.len());
        let images: Vec<String> = frames.iter().map(|f| f.jpeg_base64.clone()).collect();
        let request = ModelRequest::vision(prompt, images).with_schema(VISION_SCHEMA);

        let raw = generate_with_retry(self.backend.as_ref(), &request, &self.retry).await?;

        let assessment = parse_vision_response(zone_id, &raw);
        tracing::info!(
            zone_id = %zone_id,
            frames = frames.len(),
            crowd_density = assessment.crowd_density.as_str(),
            behavior = assessment.behavior.as_str(),
            risks = assessment.risks.len(),
            confidence = assessment.confidence,
            "Zone assessment completed"
        );
        Ok(assessment)
    }
}

fn build_vision_prompt(zone_id: &str, frame_count: usize) -> String {
    format!(
        "You are a crowd safety analyst monitoring a live event. Analyze these {frame_count} \
         surveillance frames from {zone_id}, in chronological order. Assess the crowd density, \
         the predominant crowd behavior, specific safety risks you can see, and the state of \
         infrastructure (barriers, exits, facilities). Respond with a single JSON object only."
    )
}

/// Decode the model's vision response, falling back rather than failing
fn parse_vision_response(zone_id: &str, raw: &str) -> ZoneAssessment {
    let parsed = extract_json_block(raw)
        .and_then(|block| serde_json::from_str::<RawVisionResponse>(block).ok());

    match parsed {
        Some(r) => ZoneAssessment {
            zone_id: zone_id.to_string(),
            crowd_density: r
                .crowd_density
                .as_deref()
                .map(CrowdDensity::parse_loose)
                .unwrap_or(CrowdDensity::Unknown),
            behavior: r
                .crowd_behavior
                .as_deref()
                .map(CrowdBehavior::parse_loose)
                .unwrap_or(CrowdBehavior::Unknown),
            risks: r.risks,
            infrastructure_notes: r.infrastructure_notes,
            confidence: clamp_confidence(r.confidence),
            timestamp: Utc::now(),
        },
        None => {
            tracing::warn!(
                zone_id = %zone_id,
                raw_len = raw.len(),
                "Vision response was not valid JSON, using fallback assessment"
            );
            ZoneAssessment {
                zone_id: zone_id.to_string(),
                crowd_density: CrowdDensity::Unknown,
                behavior: CrowdBehavior::Unknown,
                risks: Vec::new(),
                infrastructure_notes: vec![format!(
                    "Unparsed model output: {}",
                    truncate_raw(raw, 200)
                )],
                confidence: FALLBACK_CONFIDENCE,
                timestamp: Utc::now(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedBackend {
        response: Result<String, ModelError>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn ok(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                calls: AtomicU32::new(0),
            }
        }

        fn err(e: ModelError) -> Self {
            Self {
                response: Err(e),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn frame() -> SampledFrame {
        SampledFrame {
            timestamp: Utc::now(),
            jpeg_base64: "AAAA".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_frames_skip_model_call() {
        let backend = Arc::new(ScriptedBackend::ok("{}"));
        let analyzer = VisionAnalyzer::new(backend.clone());

        let assessment = analyzer.analyze_zone("Zone A", &[]).await.unwrap();
        assert_eq!(assessment.crowd_density, CrowdDensity::Unknown);
        assert!(assessment.confidence < 0.2);
        assert_eq!(
            backend.calls.load(Ordering::SeqCst),
            0,
            "empty input must not consume a model call"
        );
    }

    #[tokio::test]
    async fn test_well_formed_response_parsed() {
        let backend = Arc::new(ScriptedBackend::ok(
            r#"Here is my analysis:
            {"crowd_density": "high", "crowd_behavior": "restless",
             "risks": ["crowd surge near barrier"],
             "infrastructure_notes": ["east exit partially blocked"],
             "confidence": 0.85}"#,
        ));
        let analyzer = VisionAnalyzer::new(backend);

        let assessment = analyzer.analyze_zone("Zone B", &[frame()]).await.unwrap();
        assert_eq!(assessment.crowd_density, CrowdDensity::High);
        assert_eq!(assessment.behavior, CrowdBehavior::Restless);
        assert_eq!(assessment.risks.len(), 1);
        assert!((assessment.confidence - 0.85).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_unparseable_response_degrades_to_fallback() {
        let backend = Arc::new(ScriptedBackend::ok("the crowd looks fine to me"));
        let analyzer = VisionAnalyzer::new(backend);

        let assessment = analyzer.analyze_zone("Zone C", &[frame()]).await.unwrap();
        assert_eq!(assessment.crowd_density, CrowdDensity::Unknown);
        assert!((assessment.confidence - FALLBACK_CONFIDENCE).abs() < f32::EPSILON);
        assert!(
            assessment.infrastructure_notes[0].contains("the crowd looks fine"),
            "raw text must be preserved for operators"
        );
    }

    #[tokio::test]
    async fn test_unknown_enum_values_map_to_unknown() {
        let backend = Arc::new(ScriptedBackend::ok(
            r#"{"crowd_density": "packed", "crowd_behavior": "rowdy", "confidence": 2.5}"#,
        ));
        let analyzer = VisionAnalyzer::new(backend);

        let assessment = analyzer.analyze_zone("Zone D", &[frame()]).await.unwrap();
        assert_eq!(assessment.crowd_density, CrowdDensity::Unknown);
        assert_eq!(assessment.behavior, CrowdBehavior::Unknown);
        assert!((assessment.confidence - 1.0).abs() < f32::EPSILON, "confidence clamped to 1.0");
    }

    #[tokio::test]
    async fn test_terminal_backend_error_propagates() {
        let backend = Arc::new(ScriptedBackend::err(ModelError::Auth(
            "bad key".to_string(),
        )));
        let analyzer = VisionAnalyzer::new(backend);

        let result = analyzer.analyze_zone("Zone A", &[frame()]).await;
        assert!(matches!(
            result,
            Err(AnalyzerError::Model(ModelError::Auth(_)))
        ));
    }
}
