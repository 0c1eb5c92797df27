//! External model collaborator contract
//!
//! The analyzers and the query engine talk to a single external
//! vision/text model through the narrow [`ModelBackend`] trait. The
//! trait is the seam for testing: production uses the Gemini REST
//! client, tests substitute a scripted backend.
//!
//! Every response is treated as untrusted input: callers extract a JSON
//! block with [`extract_json_block`] and decode it leniently, falling
//! back to sentinel values rather than propagating parse failures.

pub mod gemini;
pub mod retry;

pub use gemini::GeminiClient;
pub use retry::{generate_with_retry, RetryPolicy};

use thiserror::Error;

/// Task kind for a model request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Image understanding (frame analysis)
    Vision,
    /// Text understanding (reports, queries)
    Text,
}

/// Request to the external model
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Task kind (selects model capabilities)
    pub kind: TaskKind,
    /// Instruction prompt
    pub prompt: String,
    /// Base64-encoded JPEG payloads for vision tasks
    pub images_jpeg_base64: Vec<String>,
    /// Optional JSON schema the response should follow
    pub schema_hint: Option<String>,
}

impl ModelRequest {
    /// Text-only request
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Text,
            prompt: prompt.into(),
            images_jpeg_base64: Vec::new(),
            schema_hint: None,
        }
    }

    /// Vision request with one or more frames
    pub fn vision(prompt: impl Into<String>, images_jpeg_base64: Vec<String>) -> Self {
        Self {
            kind: TaskKind::Vision,
            prompt: prompt.into(),
            images_jpeg_base64,
            schema_hint: None,
        }
    }

    /// Attach a structured-output schema hint
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_hint = Some(schema.into());
        self
    }
}

/// Model backend failure modes
///
/// `Timeout` and `Transient` are retryable with bounded backoff; the
/// rest are terminal for the call.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Missing or rejected credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// API quota exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The call did not complete within the request timeout
    #[error("Request timed out")]
    Timeout,

    /// Transient server-side or network failure (retryable)
    #[error("Transient error: {0}")]
    Transient(String),

    /// Request was malformed (not retryable)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ModelError {
    /// Whether retrying this call can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::Timeout | ModelError::Transient(_))
    }
}

/// External model backend
///
/// One concrete implementation in production ([`GeminiClient`]); tests
/// provide scripted implementations.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name for logging and provenance
    fn name(&self) -> &'static str;

    /// Generate a free-form or structured text response
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Extract the outermost JSON object from free-form model text
///
/// Models frequently wrap JSON in prose or markdown fences; this takes
/// the span from the first `{` to the last `}`. Returns None when no
/// such span exists. The caller still has to parse the result.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}
