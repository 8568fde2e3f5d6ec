//! Request/response types for the answer endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default daemon address used by chorusctl
pub const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:8080";

/// Selection policy requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Fast,
    Quality,
}

impl Mode {
    /// Lenient parse for inbound requests.
    ///
    /// Missing or unrecognized values fall back to fast mode.
    pub fn from_request(raw: Option<&str>) -> Self {
        match raw.map(|m| m.trim().to_ascii_lowercase()) {
            Some(m) if m == "quality" => Mode::Quality,
            _ => Mode::Fast,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Fast => "fast",
            Mode::Quality => "quality",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request body, as sent on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl AnswerRequest {
    pub fn new(prompt: impl Into<String>, mode: Mode) -> Self {
        Self {
            prompt: prompt.into(),
            mode: Some(mode.as_str().to_string()),
        }
    }

    /// Validate the request and resolve its mode
    pub fn normalize(&self) -> Result<Query, RequestError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(RequestError::EmptyPrompt);
        }

        Ok(Query {
            prompt: prompt.to_string(),
            mode: Mode::from_request(self.mode.as_deref()),
        })
    }
}

/// A validated request: trimmed, non-empty prompt plus resolved mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub prompt: String,
    pub mode: Mode,
}

impl Query {
    pub fn new(prompt: impl Into<String>, mode: Mode) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
        }
    }
}

/// Request validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("bad json: {0}")]
    BadJson(String),

    #[error("prompt required")]
    EmptyPrompt,
}

/// One backend's answer plus its observed latency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub provider: String,
    pub text: String,
    pub latency_ms: u64,
}

/// Final answer for a request. This exact value is cached and returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResponse {
    #[serde(rename = "final")]
    pub final_answer: String,
    pub candidates: Vec<Candidate>,
    pub cached: bool,
    pub mode: Mode,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Response of GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults_to_fast() {
        assert_eq!(Mode::from_request(None), Mode::Fast);
        assert_eq!(Mode::from_request(Some("")), Mode::Fast);
        assert_eq!(Mode::from_request(Some("turbo")), Mode::Fast);
        assert_eq!(Mode::from_request(Some(" Quality ")), Mode::Quality);
    }

    #[test]
    fn test_normalize_trims_prompt() {
        let req = AnswerRequest {
            prompt: "  what is rust?\n".to_string(),
            mode: Some("QUALITY".to_string()),
        };
        let query = req.normalize().unwrap();
        assert_eq!(query.prompt, "what is rust?");
        assert_eq!(query.mode, Mode::Quality);
    }

    #[test]
    fn test_normalize_rejects_blank_prompt() {
        let req = AnswerRequest {
            prompt: " \t\n".to_string(),
            mode: None,
        };
        assert_eq!(req.normalize(), Err(RequestError::EmptyPrompt));
    }

    #[test]
    fn test_missing_fields_deserialize() {
        let req: AnswerRequest = serde_json::from_str("{}").unwrap();
        assert!(req.prompt.is_empty());
        assert!(req.mode.is_none());
        assert_eq!(req.normalize(), Err(RequestError::EmptyPrompt));
    }

    #[test]
    fn test_response_uses_final_field() {
        let resp = AnswerResponse {
            final_answer: "42".to_string(),
            candidates: vec![Candidate {
                provider: "llama3.2".to_string(),
                text: "42".to_string(),
                latency_ms: 12,
            }],
            cached: false,
            mode: Mode::Quality,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["final"], "42");
        assert_eq!(json["mode"], "quality");
        assert_eq!(json["candidates"][0]["latency_ms"], 12);
    }
}
