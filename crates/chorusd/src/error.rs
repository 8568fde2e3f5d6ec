//! Request-level errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chorus_common::{ErrorBody, RequestError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidRequest(#[from] RequestError),

    /// Request body over the configured size limit
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Every backend failed; nothing to answer with
    #[error("{}", upstream_message(.rate_limited))]
    UpstreamUnavailable { rate_limited: bool },
}

fn upstream_message(rate_limited: &bool) -> &'static str {
    if *rate_limited {
        "no model responses (backend is rate limiting requests)"
    } else {
        "no model responses (is the generation backend running?)"
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PipelineError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::UpstreamUnavailable { rate_limited: true } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            PipelineError::UpstreamUnavailable { rate_limited: false } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::PayloadTooLarge { .. } => "too_large",
            PipelineError::UpstreamUnavailable { rate_limited: true } => "rate_limited",
            PipelineError::UpstreamUnavailable { rate_limited: false } => "unavailable",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.to_string())
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
