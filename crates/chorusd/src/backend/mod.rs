//! Generation backend abstraction
//!
//! The pipeline talks to text-generation models only through
//! [`GenerationBackend`]. Production code uses [`OllamaBackend`]; tests use
//! [`FakeBackend`] with scripted replies so no network is touched.

pub mod fake;
pub mod ollama;

pub use fake::{FakeBackend, FakeBackendBuilder, FakeReply};
pub use ollama::OllamaBackend;

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single backend call. Always soft from the pipeline's view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend not reachable: {0}")]
    Unavailable(String),

    #[error("backend is rate limited")]
    RateLimited,

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend call timed out")]
    Timeout,

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("backend reported an error: {0}")]
    Remote(String),

    #[error("backend returned empty text")]
    Empty,

    #[error("HTTP error: {0}")]
    Http(String),
}

impl BackendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited)
    }

    /// Short label for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            BackendError::Unavailable(_) => "unavailable",
            BackendError::RateLimited => "rate_limited",
            BackendError::Status { .. } => "status",
            BackendError::Timeout => "timeout",
            BackendError::Decode(_) => "decode",
            BackendError::Remote(_) => "remote",
            BackendError::Empty => "empty",
            BackendError::Http(_) => "http",
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_connect() {
            BackendError::Unavailable(e.to_string())
        } else if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Http(e.to_string())
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Receives streamed text fragments in arrival order
pub trait FragmentSink: Send {
    fn accept(&mut self, fragment: &str);
}

/// Collects fragments into a string
impl FragmentSink for String {
    fn accept(&mut self, fragment: &str) {
        self.push_str(fragment);
    }
}

/// A text-generation service reachable by model name
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Single request/response generation. Returns the raw generated text.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError>;

    /// Streaming generation. Every non-empty fragment is handed to `sink`
    /// as it arrives; the concatenated text is returned on completion.
    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        sink: &mut dyn FragmentSink,
    ) -> Result<String, BackendError>;
}
