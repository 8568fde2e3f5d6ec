//! API routes for chorusd

use crate::error::PipelineError;
use crate::server::AppState;
use crate::streaming::{rejected_session, spawn_session};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chorus_common::{AnswerRequest, AnswerResponse, HealthResponse, Query, RequestError};
use std::sync::Arc;
use tracing::{error, info};

type AppStateArc = Arc<AppState>;

/// Label for requests rejected before a mode was resolved
const UNRESOLVED_MODE: &str = "none";

// ============================================================================
// Answer Routes
// ============================================================================

pub fn answer_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/answer", post(answer))
        .route("/answer/stream", post(answer_stream))
}

/// Decode and validate an answer request body
fn parse_request(
    payload: Result<Json<AnswerRequest>, JsonRejection>,
    max_body_bytes: usize,
) -> Result<Query, PipelineError> {
    let Json(request) = payload.map_err(|rej| {
        if rej.status() == StatusCode::PAYLOAD_TOO_LARGE {
            PipelineError::PayloadTooLarge {
                limit: max_body_bytes,
            }
        } else {
            PipelineError::from(RequestError::BadJson(rej.body_text()))
        }
    })?;
    Ok(request.normalize()?)
}

async fn answer(
    State(state): State<AppStateArc>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, PipelineError> {
    let query = match parse_request(payload, state.max_body_bytes) {
        Ok(query) => query,
        Err(e) => {
            state.metrics.record_request(UNRESOLVED_MODE, e.label());
            return Err(e);
        }
    };
    info!("Answer request ({} mode, {} chars)", query.mode, query.prompt.len());

    let response = state.pipeline.answer(&query).await?;
    Ok(Json(response))
}

async fn answer_stream(
    State(state): State<AppStateArc>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Response {
    match parse_request(payload, state.max_body_bytes) {
        Ok(query) => {
            info!("Streaming answer request ({} mode, {} chars)", query.mode, query.prompt.len());
            spawn_session(Arc::clone(&state.pipeline), query)
        }
        Err(e) => {
            state.metrics.record_request(UNRESOLVED_MODE, e.label());
            rejected_session(e)
        }
    }
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cache_entries: state.cache.len().await,
    })
}

// ============================================================================
// Metrics Routes
// ============================================================================

pub fn metrics_routes() -> Router<AppStateArc> {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics(State(state): State<AppStateArc>) -> Response {
    match state.metrics.export() {
        Ok(text) => ([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
