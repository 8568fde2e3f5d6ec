//! Fake generation backend for deterministic testing
//!
//! Replies are scripted per model for answer calls, and separately for the
//! judge and synthesis calls (recognized by their prompt preamble), so a test
//! can give the judge model one answer as a candidate and another as a judge.
//!
//! ```rust,ignore
//! let fake = FakeBackendBuilder::new()
//!     .answer("llama3.2", FakeReply::text("short answer"))
//!     .answer("qwen2.5", FakeReply::text("another answer"))
//!     .judge(FakeReply::text(r#"[{"idx":1,"score":9,"notes":""}]"#))
//!     .synthesis(FakeReply::fragments(&["merged ", "answer"]))
//!     .build();
//! ```

use super::{BackendError, FragmentSink, GenerationBackend};
use crate::{judge, synth};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a prompt is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Answer,
    Judge,
    Synthesis,
}

impl CallKind {
    pub fn classify(prompt: &str) -> Self {
        if prompt.starts_with(judge::JUDGE_PREAMBLE) {
            CallKind::Judge
        } else if prompt.starts_with(synth::SYNTH_PREAMBLE) {
            CallKind::Synthesis
        } else {
            CallKind::Answer
        }
    }
}

/// Scripted reply: fragments to produce, an optional failure after them,
/// and a delay before the first byte
#[derive(Debug, Clone)]
pub struct FakeReply {
    pub fragments: Vec<String>,
    pub failure: Option<BackendError>,
    pub delay: Duration,
}

impl FakeReply {
    /// Successful reply delivered as a single fragment
    pub fn text(text: &str) -> Self {
        Self::fragments(&[text])
    }

    /// Successful reply delivered as several stream fragments
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            failure: None,
            delay: Duration::ZERO,
        }
    }

    /// Failed call with no output
    pub fn error(error: BackendError) -> Self {
        Self {
            fragments: Vec::new(),
            failure: Some(error),
            delay: Duration::ZERO,
        }
    }

    /// Stream that yields `fragments` and then fails
    pub fn broken_stream(fragments: &[&str], error: BackendError) -> Self {
        Self {
            failure: Some(error),
            ..Self::fragments(fragments)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn full_text(&self) -> String {
        self.fragments.concat()
    }
}

/// Fake backend with scripted replies and call counters
pub struct FakeBackend {
    answers: HashMap<String, FakeReply>,
    judge: Option<FakeReply>,
    synthesis: Option<FakeReply>,
    answer_calls: AtomicUsize,
    judge_calls: AtomicUsize,
    synthesis_calls: AtomicUsize,
    /// Prompts received, in call order
    prompts: Arc<Mutex<Vec<(CallKind, String)>>>,
}

impl FakeBackend {
    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    pub fn judge_calls(&self) -> usize {
        self.judge_calls.load(Ordering::SeqCst)
    }

    pub fn synthesis_calls(&self) -> usize {
        self.synthesis_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.answer_calls() + self.judge_calls() + self.synthesis_calls()
    }

    /// Prompts of the given kind, in call order
    pub fn prompts(&self, kind: CallKind) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| {
                p.iter()
                    .filter(|(k, _)| *k == kind)
                    .map(|(_, prompt)| prompt.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record(&self, model: &str, prompt: &str) -> Result<FakeReply, BackendError> {
        let kind = CallKind::classify(prompt);
        let counter = match kind {
            CallKind::Answer => &self.answer_calls,
            CallKind::Judge => &self.judge_calls,
            CallKind::Synthesis => &self.synthesis_calls,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((kind, prompt.to_string()));
        }

        let reply = match kind {
            CallKind::Answer => self.answers.get(model),
            CallKind::Judge => self.judge.as_ref(),
            CallKind::Synthesis => self.synthesis.as_ref(),
        };
        reply
            .cloned()
            .ok_or_else(|| BackendError::Unavailable(format!("no fake reply for {}", model)))
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        let reply = self.record(model, prompt)?;
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        match reply.failure {
            Some(err) => Err(err),
            None => Ok(reply.full_text()),
        }
    }

    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        sink: &mut dyn FragmentSink,
    ) -> Result<String, BackendError> {
        let reply = self.record(model, prompt)?;
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        let mut full = String::new();
        for fragment in &reply.fragments {
            if fragment.is_empty() {
                continue;
            }
            full.push_str(fragment);
            sink.accept(fragment);
            tokio::task::yield_now().await;
        }

        match reply.failure {
            Some(err) => Err(err),
            None => Ok(full),
        }
    }
}

/// Builder for [`FakeBackend`]
#[derive(Default)]
pub struct FakeBackendBuilder {
    answers: HashMap<String, FakeReply>,
    judge: Option<FakeReply>,
    synthesis: Option<FakeReply>,
}

impl FakeBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply for answer calls to `model`
    pub fn answer(mut self, model: &str, reply: FakeReply) -> Self {
        self.answers.insert(model.to_string(), reply);
        self
    }

    /// Reply for judge calls, whatever the model
    pub fn judge(mut self, reply: FakeReply) -> Self {
        self.judge = Some(reply);
        self
    }

    /// Reply for synthesis calls, whatever the model
    pub fn synthesis(mut self, reply: FakeReply) -> Self {
        self.synthesis = Some(reply);
        self
    }

    pub fn build(self) -> FakeBackend {
        FakeBackend {
            answers: self.answers,
            judge: self.judge,
            synthesis: self.synthesis,
            answer_calls: AtomicUsize::new(0),
            judge_calls: AtomicUsize::new(0),
            synthesis_calls: AtomicUsize::new(0),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}
