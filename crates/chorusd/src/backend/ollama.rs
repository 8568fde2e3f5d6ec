//! Ollama HTTP client
//!
//! Endpoints used:
//! - POST /api/generate (stream: false) - single JSON response
//! - POST /api/generate (stream: true) - newline-delimited JSON chunks

use super::{BackendError, FragmentSink, GenerationBackend};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const OLLAMA_DEFAULT_URL: &str = "http://127.0.0.1:11434";

/// Request for /api/generate
#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response from /api/generate (non-streaming)
#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// One chunk from /api/generate (streaming)
#[derive(Debug, Clone, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Ollama client for the generate API
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl OllamaBackend {
    /// Create a client for `base_url`.
    ///
    /// `request_timeout` bounds non-streaming calls; streaming calls are
    /// bounded only by the pipeline deadline.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Map a non-success status to an error, consuming the body for context
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status.as_u16() == 429 {
            return Err(BackendError::RateLimited);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: OLLAMA_DEFAULT_URL.to_string(),
            request_timeout: Duration::from_secs(180),
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let resp = self
            .http
            .post(self.generate_url())
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        debug!("{} generated {} chars", model, body.response.len());
        Ok(body.response)
    }

    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        sink: &mut dyn FragmentSink,
    ) -> Result<String, BackendError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: true,
        };

        let resp = self
            .http
            .post(self.generate_url())
            .json(&request)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;

        let mut stream = resp.bytes_stream();
        let mut decoder = ChunkDecoder::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            if decoder.feed(&bytes, sink)? {
                return Ok(decoder.into_text());
            }
        }

        // Body ended without a done chunk; flush whatever is buffered
        decoder.finish(sink)?;
        Ok(decoder.into_text())
    }
}

// ============================================================================
// NDJSON chunk decoding
// ============================================================================

/// Splits a byte stream into NDJSON lines and forwards response text.
///
/// Bytes are buffered until a newline so multi-byte characters split across
/// network chunks are decoded intact.
#[derive(Debug, Default)]
struct ChunkDecoder {
    buffer: Vec<u8>,
    text: String,
}

impl ChunkDecoder {
    /// Feed raw bytes. Returns true once a `done` chunk was seen.
    fn feed(&mut self, bytes: &[u8], sink: &mut dyn FragmentSink) -> Result<bool, BackendError> {
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.line(&line, sink)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn finish(&mut self, sink: &mut dyn FragmentSink) -> Result<(), BackendError> {
        let rest = std::mem::take(&mut self.buffer);
        self.line(&rest, sink)?;
        Ok(())
    }

    fn line(&mut self, raw: &[u8], sink: &mut dyn FragmentSink) -> Result<bool, BackendError> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| BackendError::Decode(e.to_string()))?
            .trim();
        if line.is_empty() {
            return Ok(false);
        }

        let chunk: StreamChunk =
            serde_json::from_str(line).map_err(|e| BackendError::Decode(e.to_string()))?;

        if let Some(err) = chunk.error {
            return Err(BackendError::Remote(err));
        }
        if !chunk.response.is_empty() {
            self.text.push_str(&chunk.response);
            sink.accept(&chunk.response);
        }
        Ok(chunk.done)
    }

    fn into_text(self) -> String {
        self.text
    }
}
