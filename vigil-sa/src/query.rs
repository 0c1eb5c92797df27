//! Query engine
//!
//! Answers operator questions strictly from the published snapshot. The
//! snapshot is serialized into the prompt as the model's only context;
//! answers cite the zones they drew on, filtered against the snapshot
//! so the model cannot invent zones. With no snapshot published yet the
//! engine answers without touching the model at all.

use crate::model::{
    extract_json_block, generate_with_retry, ModelBackend, ModelRequest, RetryPolicy,
};
use serde::Deserialize;
use std::sync::Arc;
use vigil_common::types::{clamp_confidence, QueryAnswer, SituationSnapshot, ThreatLevel};

/// Confidence assigned when model output could not be parsed
const FALLBACK_CONFIDENCE: f32 = 0.3;

const QUERY_SCHEMA: &str = r#"{
  "answer": "string",
  "confidence": 0.0,
  "supporting_zones": ["zone name"]
}"#;

#[derive(Debug, Deserialize)]
struct RawQueryResponse {
    #[serde(default, alias = "answer_text")]
    answer: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    supporting_zones: Vec<String>,
}

pub struct QueryEngine {
    backend: Arc<dyn ModelBackend>,
    retry: RetryPolicy,
}

impl QueryEngine {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    /// Answer a question against the current snapshot
    pub async fn answer(
        &self,
        question: &str,
        snapshot: Option<&SituationSnapshot>,
    ) -> QueryAnswer {
        let Some(snapshot) = snapshot else {
            tracing::info!("Query received before any snapshot was published");
            return QueryAnswer::not_initialized();
        };

        let context = match serde_json::to_string_pretty(snapshot) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize snapshot for query context");
                return QueryAnswer {
                    answer_text: "The current situation data could not be prepared for \
                                  answering. Try again after the next analysis run."
                        .to_string(),
                    confidence: 0.0,
                    supporting_zones: Vec::new(),
                    grounded: true,
                };
            }
        };

        let prompt = build_query_prompt(question, &context);
        let request = ModelRequest::text(prompt).with_schema(QUERY_SCHEMA);

        match generate_with_retry(self.backend.as_ref(), &request, &self.retry).await {
            Ok(raw) => parse_query_response(&raw, snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Query model call failed");
                QueryAnswer {
                    answer_text: "The analysis assistant is temporarily unavailable. The \
                                  published snapshot is still current; try again shortly."
                        .to_string(),
                    confidence: 0.0,
                    supporting_zones: Vec::new(),
                    grounded: true,
                }
            }
        }
    }

    /// Suggested questions for the operator UI
    ///
    /// A static core plus entries driven by the snapshot's hot spots.
    pub fn suggested_questions(snapshot: Option<&SituationSnapshot>) -> Vec<String> {
        let mut questions = vec![
            "What is the overall threat level right now?".to_string(),
            "Which zone needs attention first?".to_string(),
            "Are there any conflicts between video and field reports?".to_string(),
            "What is the status of medical and security resources?".to_string(),
        ];

        if let Some(snapshot) = snapshot {
            if let Some((zone_id, _)) = snapshot
                .zones
                .iter()
                .filter(|(_, v)| v.threat_level >= ThreatLevel::High)
                .max_by_key(|(_, v)| v.threat_level)
            {
                questions.push(format!("What is happening in {}?", zone_id));
            }
            for zone_id in snapshot.degraded_zones.keys() {
                questions.push(format!(
                    "Why is there no current analysis for {}?",
                    zone_id
                ));
            }
        }

        questions
    }
}

fn build_query_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a situational awareness assistant for live event operations. Answer the \
         operator's question using ONLY the situation snapshot below. If the snapshot does not \
         contain the answer, say so plainly. List the zones your answer draws on in \
         supporting_zones, using their exact names. Respond with a single JSON object only.\n\n\
         Situation snapshot:\n{context}\n\nQuestion: {question}"
    )
}

fn parse_query_response(raw: &str, snapshot: &SituationSnapshot) -> QueryAnswer {
    let parsed = extract_json_block(raw)
        .and_then(|block| serde_json::from_str::<RawQueryResponse>(block).ok());

    match parsed {
        Some(r) => QueryAnswer {
            answer_text: r
                .answer
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| "The model returned no answer text.".to_string()),
            confidence: clamp_confidence(r.confidence),
            supporting_zones: filter_supporting_zones(r.supporting_zones, snapshot),
            grounded: true,
        },
        None => {
            tracing::warn!(raw_len = raw.len(), "Query response was not valid JSON");
            QueryAnswer {
                answer_text: raw.trim().to_string(),
                confidence: FALLBACK_CONFIDENCE,
                supporting_zones: Vec::new(),
                grounded: true,
            }
        }
    }
}

/// Keep only zones that exist in the snapshot, in canonical spelling,
/// first mention first and without repeats
fn filter_supporting_zones(reported: Vec<String>, snapshot: &SituationSnapshot) -> Vec<String> {
    let mut zones: Vec<String> = Vec::new();
    for name in &reported {
        if let Some(canonical) = snapshot
            .zones
            .keys()
            .find(|z| z.eq_ignore_ascii_case(name.trim()))
        {
            if !zones.contains(canonical) {
                zones.push(canonical.clone());
            }
        }
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vigil_common::types::ZoneView;

    struct ScriptedBackend {
        response: Result<String, ModelError>,
        calls: AtomicU32,
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

    fn snapshot_with_zones(zone_ids: &[&str]) -> SituationSnapshot {
        let zones = zone_ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    ZoneView {
                        assessment: None,
                        finding: None,
                        discrepancies: Vec::new(),
                        recommended_actions: Vec::new(),
                        threat_level: ThreatLevel::Low,
                    },
                )
            })
            .collect();
        SituationSnapshot {
            generated_at: chrono::Utc::now(),
            overall_threat_level: ThreatLevel::Low,
            zones,
            degraded_zones: BTreeMap::new(),
            confidence: 1.0,
        }
    }

    #[tokio::test]
    async fn test_no_snapshot_short_circuits_without_model_call() {
        let backend = Arc::new(ScriptedBackend {
            response: Ok("{}".to_string()),
            calls: AtomicU32::new(0),
        });
        let engine = QueryEngine::new(backend.clone());

        let answer = engine.answer("what is happening?", None).await;
        assert!(!answer.grounded);
        assert_eq!(answer.confidence, 0.0);
        assert_eq!(
            backend.calls.load(Ordering::SeqCst),
            0,
            "uninitialized state must not consume a model call"
        );
    }

    #[tokio::test]
    async fn test_supporting_zones_filtered_to_snapshot() {
        let backend = Arc::new(ScriptedBackend {
            response: Ok(r#"{"answer": "Zone A is crowded.", "confidence": 0.8,
                             "supporting_zones": ["zone a", "Zone Z"]}"#
                .to_string()),
            calls: AtomicU32::new(0),
        });
        let engine = QueryEngine::new(backend);

        let snapshot = snapshot_with_zones(&["Zone A", "Zone B"]);
        let answer = engine.answer("how is zone a?", Some(&snapshot)).await;
        assert!(answer.grounded);
        assert_eq!(
            answer.supporting_zones,
            vec!["Zone A".to_string()],
            "invented zones must be dropped, names canonicalized"
        );
    }

    #[tokio::test]
    async fn test_repeated_supporting_zones_are_deduplicated() {
        let backend = Arc::new(ScriptedBackend {
            response: Ok(r#"{"answer": "Both zones are busy.", "confidence": 0.8,
                             "supporting_zones": ["Zone A", "Zone B", "zone a"]}"#
                .to_string()),
            calls: AtomicU32::new(0),
        });
        let engine = QueryEngine::new(backend);

        let snapshot = snapshot_with_zones(&["Zone A", "Zone B"]);
        let answer = engine.answer("how busy is it?", Some(&snapshot)).await;
        assert_eq!(
            answer.supporting_zones,
            vec!["Zone A".to_string(), "Zone B".to_string()],
            "a zone repeated non-adjacently must appear once, first mention first"
        );
    }

    #[tokio::test]
    async fn test_unparseable_response_falls_back_to_raw_text() {
        let backend = Arc::new(ScriptedBackend {
            response: Ok("Everything looks calm right now.".to_string()),
            calls: AtomicU32::new(0),
        });
        let engine = QueryEngine::new(backend);

        let snapshot = snapshot_with_zones(&["Zone A"]);
        let answer = engine.answer("status?", Some(&snapshot)).await;
        assert_eq!(answer.answer_text, "Everything looks calm right now.");
        assert!((answer.confidence - FALLBACK_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_backend_failure_yields_unavailable_answer() {
        let backend = Arc::new(ScriptedBackend {
            response: Err(ModelError::Auth("bad key".to_string())),
            calls: AtomicU32::new(0),
        });
        let engine = QueryEngine::new(backend);

        let snapshot = snapshot_with_zones(&["Zone A"]);
        let answer = engine.answer("status?", Some(&snapshot)).await;
        assert!(answer.answer_text.contains("temporarily unavailable"));
        assert_eq!(answer.confidence, 0.0);
    }

    #[test]
    fn test_suggestions_include_degraded_zones() {
        let mut snapshot = snapshot_with_zones(&["Zone A"]);
        snapshot
            .degraded_zones
            .insert("Zone B".to_string(), "model_timeout".to_string());

        let questions = QueryEngine::suggested_questions(Some(&snapshot));
        assert!(questions.iter().any(|q| q.contains("Zone B")));
    }

    #[test]
    fn test_suggestions_work_without_snapshot() {
        let questions = QueryEngine::suggested_questions(None);
        assert!(!questions.is_empty());
    }
}
