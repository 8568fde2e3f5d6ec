//! Streaming session frames (NDJSON, one frame per line).
//!
//! A session is an ordered sequence of frames terminated by exactly one
//! `summary` or `error` frame. Concatenating every `delta` payload gives the
//! same text as `summary.meta.final`.

use crate::types::AnswerResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One self-contained message of a streaming session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// Advisory progress note
    Status { text: String },
    /// Incremental answer fragment
    Delta { text: String },
    /// Terminal failure
    Error { text: String },
    /// Terminal success
    Summary { meta: AnswerResponse },
}

impl StreamFrame {
    pub fn status(text: impl Into<String>) -> Self {
        StreamFrame::Status { text: text.into() }
    }

    pub fn delta(text: impl Into<String>) -> Self {
        StreamFrame::Delta { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        StreamFrame::Error { text: text.into() }
    }

    pub fn summary(meta: AnswerResponse) -> Self {
        StreamFrame::Summary { meta }
    }

    /// Whether this frame ends a session
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Error { .. } | StreamFrame::Summary { .. })
    }

    /// Wire label of the frame type
    pub fn kind(&self) -> &'static str {
        match self {
            StreamFrame::Status { .. } => "status",
            StreamFrame::Delta { .. } => "delta",
            StreamFrame::Error { .. } => "error",
            StreamFrame::Summary { .. } => "summary",
        }
    }

    /// Encode as a single NDJSON line, newline included
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","text":"frame encode failed: {}"}}"#, e));
        line.push('\n');
        line
    }

    /// Decode one NDJSON line
    pub fn from_line(line: &str) -> Result<Self, FrameError> {
        serde_json::from_str(line.trim()).map_err(|e| FrameError::Decode(e.to_string()))
    }
}

/// Protocol violations detected while reading a session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Decode(String),

    #[error("{0} frame received after the session ended")]
    AfterTerminal(&'static str),

    #[error("session ended without a summary or error frame")]
    Unterminated,

    #[error("delta fragments do not match the summary answer")]
    DeltaMismatch,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Answer(AnswerResponse),
    Failed(String),
}

/// Client-side reassembly of a frame sequence
#[derive(Debug, Default)]
pub struct SessionReader {
    text: String,
    saw_delta: bool,
    statuses: Vec<String>,
    outcome: Option<SessionOutcome>,
}

impl SessionReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next frame in arrival order
    pub fn push(&mut self, frame: StreamFrame) -> Result<(), FrameError> {
        if self.outcome.is_some() {
            return Err(FrameError::AfterTerminal(frame.kind()));
        }

        match frame {
            StreamFrame::Status { text } => self.statuses.push(text),
            StreamFrame::Delta { text } => {
                self.saw_delta = true;
                self.text.push_str(&text);
            }
            StreamFrame::Error { text } => self.outcome = Some(SessionOutcome::Failed(text)),
            StreamFrame::Summary { meta } => {
                if self.saw_delta && self.text != meta.final_answer {
                    return Err(FrameError::DeltaMismatch);
                }
                self.outcome = Some(SessionOutcome::Answer(meta));
            }
        }
        Ok(())
    }

    /// Decode and feed one NDJSON line. Blank lines are skipped.
    pub fn push_line(&mut self, line: &str) -> Result<Option<StreamFrame>, FrameError> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let frame = StreamFrame::from_line(line)?;
        self.push(frame.clone())?;
        Ok(Some(frame))
    }

    /// Text reconstructed from delta frames so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Close the session; fails if no terminal frame was seen
    pub fn finish(self) -> Result<SessionOutcome, FrameError> {
        self.outcome.ok_or(FrameError::Unterminated)
    }
}
