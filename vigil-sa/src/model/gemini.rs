//! Google Gemini REST client
//!
//! Implements [`ModelBackend`] over the `generateContent` endpoint with
//! a request timeout and a client-side rate limit. HTTP status codes are
//! mapped onto the [`ModelError`] taxonomy so callers can distinguish
//! retryable from terminal failures.

use super::{ModelBackend, ModelError, ModelRequest, TaskKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const VISION_MODEL: &str = "gemini-1.5-pro";
const TEXT_MODEL: &str = "gemini-1.5-pro";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const RATE_LIMIT_MS: u64 = 1000; // 1 request per second

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

// Wire types for the generateContent endpoint

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Gemini API client
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ModelError::Transient(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }

    fn model_for(&self, kind: TaskKind) -> &'static str {
        match kind {
            TaskKind::Vision => VISION_MODEL,
            TaskKind::Text => TEXT_MODEL,
        }
    }

    fn build_body(&self, request: &ModelRequest) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(request.images_jpeg_base64.len() + 2);

        let mut prompt = request.prompt.clone();
        if let Some(schema) = &request.schema_hint {
            prompt.push_str("\n\nRespond with a single JSON object matching this shape:\n");
            prompt.push_str(schema);
        }
        parts.push(Part::Text(prompt));

        for image in &request.images_jpeg_base64 {
            parts.push(Part::InlineData(InlineData {
                mime_type: "image/jpeg".to_string(),
                data: image.clone(),
            }));
        }

        GenerateContentRequest {
            contents: vec![Content { parts }],
        }
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> ModelError {
        match status.as_u16() {
            401 | 403 => ModelError::Auth(body),
            429 => ModelError::QuotaExceeded(body),
            400 | 404 => ModelError::InvalidRequest(body),
            408 => ModelError::Timeout,
            _ => ModelError::Transient(format!("HTTP {}: {}", status.as_u16(), body)),
        }
    }
}

#[async_trait::async_trait]
impl ModelBackend for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        if request.prompt.trim().is_empty() {
            return Err(ModelError::InvalidRequest("empty prompt".to_string()));
        }

        self.rate_limiter.wait().await;

        let model = self.model_for(request.kind);
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE_URL, model, self.api_key
        );

        tracing::debug!(
            model,
            images = request.images_jpeg_base64.len(),
            prompt_chars = request.prompt.len(),
            "Querying Gemini API"
        );

        let response = self
            .http_client
            .post(&url)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Transient(format!("response decode failed: {}", e)))?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::Transient("empty model response".to_string()));
        }

        tracing::debug!(model, response_chars = text.len(), "Gemini response received");

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GeminiClient::new("test-key".to_string());
        assert!(client.is_ok());
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(1000);
        assert_eq!(limiter.min_interval, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_rate_limiter_timing() {
        let limiter = RateLimiter::new(100); // 100ms for faster test

        let start = Instant::now();

        // First request - no wait
        limiter.wait().await;
        let first_elapsed = start.elapsed();

        // Second request - should wait ~100ms
        limiter.wait().await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(50));
        assert!(second_elapsed >= Duration::from_millis(90));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            GeminiClient::map_status(reqwest::StatusCode::UNAUTHORIZED, String::new()),
            ModelError::Auth(_)
        ));
        assert!(matches!(
            GeminiClient::map_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            ModelError::QuotaExceeded(_)
        ));
        assert!(matches!(
            GeminiClient::map_status(reqwest::StatusCode::BAD_REQUEST, String::new()),
            ModelError::InvalidRequest(_)
        ));
        assert!(matches!(
            GeminiClient::map_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, String::new()),
            ModelError::Transient(_)
        ));
    }

    #[test]
    fn test_schema_hint_appended_to_prompt() {
        let client = GeminiClient::new("k".to_string()).unwrap();
        let request = ModelRequest::text("analyze this").with_schema("{\"x\": 1}");
        let body = client.build_body(&request);
        match &body.contents[0].parts[0] {
            Part::Text(t) => {
                assert!(t.contains("analyze this"));
                assert!(t.contains("{\"x\": 1}"));
            }
            _ => panic!("first part should be the prompt text"),
        }
    }
}
