//! NDJSON streaming sessions.
//!
//! The pipeline runs in its own task and reports through a [`SessionEmitter`];
//! frames travel over an unbounded channel that the response body drains, one
//! line per frame.

use crate::backend::FragmentSink;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, SessionSink};
use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use chorus_common::{AnswerResponse, Query, StreamFrame};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";

/// Sent when a session's producer goes away without a terminal frame
pub const ABANDONED_SESSION: &str = "answer session ended unexpectedly";

/// Producer side of one session.
///
/// Guarantees exactly one terminal frame: frames after `summary` or `error`
/// are dropped, and dropping an unterminated emitter sends an `error` frame.
pub struct SessionEmitter {
    tx: UnboundedSender<StreamFrame>,
    terminated: bool,
}

impl SessionEmitter {
    pub fn channel() -> (Self, UnboundedReceiver<StreamFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                terminated: false,
            },
            rx,
        )
    }

    pub fn emit(&mut self, frame: StreamFrame) {
        if self.terminated {
            debug!("Dropping {} frame after session end", frame.kind());
            return;
        }
        if frame.is_terminal() {
            self.terminated = true;
        }
        // Receiver gone means the client disconnected
        let _ = self.tx.send(frame);
    }

    /// Send the terminal frame for `result`
    pub fn finish(mut self, result: Result<AnswerResponse, PipelineError>) {
        match result {
            Ok(response) => self.emit(StreamFrame::summary(response)),
            Err(e) => self.emit(StreamFrame::error(e.to_string())),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl FragmentSink for SessionEmitter {
    fn accept(&mut self, fragment: &str) {
        self.emit(StreamFrame::delta(fragment));
    }
}

impl SessionSink for SessionEmitter {
    fn status(&mut self, text: &str) {
        self.emit(StreamFrame::status(text));
    }
}

impl Drop for SessionEmitter {
    fn drop(&mut self) {
        if !self.terminated {
            self.terminated = true;
            let _ = self.tx.send(StreamFrame::error(ABANDONED_SESSION));
        }
    }
}

/// Response whose body is the NDJSON encoding of every frame from `rx`
pub fn ndjson_response(rx: UnboundedReceiver<StreamFrame>, status: StatusCode) -> Response {
    let stream = UnboundedReceiverStream::new(rx)
        .map(|frame| Ok::<_, Infallible>(frame.to_ndjson()));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Run `query` in a background task and stream its frames
pub fn spawn_session(pipeline: Arc<Pipeline>, query: Query) -> Response {
    let (mut emitter, rx) = SessionEmitter::channel();

    tokio::spawn(async move {
        let result = pipeline.answer_streaming(&query, &mut emitter).await;
        emitter.finish(result);
    });

    ndjson_response(rx, StatusCode::OK)
}

/// Single-frame session for a request rejected before any work started
pub fn rejected_session(error: PipelineError) -> Response {
    let status = error.status_code();
    let (emitter, rx) = SessionEmitter::channel();
    emitter.finish(Err(error));
    ndjson_response(rx, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_common::{Mode, RequestError};

    fn drain(mut rx: UnboundedReceiver<StreamFrame>) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn response(text: &str) -> AnswerResponse {
        AnswerResponse {
            final_answer: text.to_string(),
            candidates: Vec::new(),
            cached: false,
            mode: Mode::Fast,
        }
    }

    #[test]
    fn test_emitter_ends_with_summary() {
        let (mut emitter, rx) = SessionEmitter::channel();
        emitter.status("running models...");
        emitter.accept("hi");
        emitter.finish(Ok(response("hi")));

        let frames = drain(rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], StreamFrame::delta("hi"));
        assert!(frames[2].is_terminal());
    }

    #[test]
    fn test_emitter_drops_frames_after_terminal() {
        let (mut emitter, rx) = SessionEmitter::channel();
        emitter.emit(StreamFrame::error("boom"));
        emitter.accept("late");
        emitter.status("late");
        assert!(emitter.is_terminated());
        drop(emitter);

        assert_eq!(drain(rx), vec![StreamFrame::error("boom")]);
    }

    #[test]
    fn test_dropped_emitter_sends_error() {
        let (mut emitter, rx) = SessionEmitter::channel();
        emitter.accept("partial");
        drop(emitter);

        assert_eq!(
            drain(rx),
            vec![
                StreamFrame::delta("partial"),
                StreamFrame::error(ABANDONED_SESSION)
            ]
        );
    }

    #[test]
    fn test_rejected_session_headers() {
        let response = rejected_session(PipelineError::from(RequestError::EmptyPrompt));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            NDJSON_CONTENT_TYPE
        );
        assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "no-cache");
    }
}
