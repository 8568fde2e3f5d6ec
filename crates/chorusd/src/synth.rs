//! Synthesis: merge the top-ranked candidates into one answer.
//!
//! Two forms share one prompt. [`synthesize`] makes a single blocking call;
//! [`synthesize_incremental`] streams fragments to a [`FragmentSink`] as the
//! model produces them.

use crate::backend::{BackendError, FragmentSink, GenerationBackend};
use chorus_common::Candidate;
use thiserror::Error;
use tokio::time::Instant;

/// First line of every synthesis prompt
pub const SYNTH_PREAMBLE: &str =
    "Combine the best parts of the answers below into ONE final answer.\n";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("no candidates to synthesize")]
    NoCandidates,

    #[error("synthesis call failed: {0}")]
    Backend(#[from] BackendError),

    #[error("synthesis exceeded the deadline")]
    Deadline,

    #[error("synthesis produced empty text")]
    Empty,

    /// The stream broke after visible text already reached the sink
    #[error("synthesis stream interrupted: {reason}")]
    Interrupted { partial: String, reason: String },
}

pub fn build_prompt(prompt: &str, top: &[&Candidate]) -> String {
    let mut out = String::from(SYNTH_PREAMBLE);
    out.push_str("Rules: be correct, remove contradictions, be concise, no fluff.\n");
    out.push_str("If a step-by-step explanation is helpful, include it.\n\n");
    out.push_str("User prompt:\n");
    out.push_str(prompt);
    out.push_str("\n\nAnswers:\n");

    for candidate in top {
        out.push_str("\n---\n");
        out.push_str(&candidate.provider);
        out.push_str(":\n");
        out.push_str(&candidate.text);
        out.push('\n');
    }
    out
}

/// Single non-streaming merge call. The merged text is returned untrimmed.
pub async fn synthesize(
    backend: &dyn GenerationBackend,
    model: &str,
    prompt: &str,
    top: &[&Candidate],
    deadline: Instant,
) -> Result<String, SynthesisError> {
    if top.is_empty() {
        return Err(SynthesisError::NoCandidates);
    }

    let merge_prompt = build_prompt(prompt, top);
    let text = tokio::time::timeout_at(deadline, backend.generate(model, &merge_prompt))
        .await
        .map_err(|_| SynthesisError::Deadline)??;

    if text.trim().is_empty() {
        return Err(SynthesisError::Empty);
    }
    Ok(text)
}

/// Streaming merge call. Fragments reach `sink` in arrival order, except that
/// leading whitespace-only fragments are held until visible text arrives.
///
/// On success the returned text equals everything handed to `sink`. A failure
/// after visible text was forwarded is reported as
/// [`SynthesisError::Interrupted`] carrying that text.
pub async fn synthesize_incremental<S>(
    backend: &dyn GenerationBackend,
    model: &str,
    prompt: &str,
    top: &[&Candidate],
    deadline: Instant,
    sink: &mut S,
) -> Result<String, SynthesisError>
where
    S: FragmentSink + ?Sized,
{
    if top.is_empty() {
        return Err(SynthesisError::NoCandidates);
    }

    let merge_prompt = build_prompt(prompt, top);
    let mut held = HeldFragments::new(sink);
    let outcome =
        tokio::time::timeout_at(deadline, backend.generate_stream(model, &merge_prompt, &mut held))
            .await;

    let error = match outcome {
        Ok(Ok(_)) if !held.forwarded.is_empty() => return Ok(held.forwarded),
        Ok(Ok(_)) => SynthesisError::Empty,
        Ok(Err(e)) => SynthesisError::Backend(e),
        Err(_) => SynthesisError::Deadline,
    };

    if held.forwarded.is_empty() {
        Err(error)
    } else {
        Err(SynthesisError::Interrupted {
            partial: held.forwarded,
            reason: error.to_string(),
        })
    }
}

/// Sink adapter that holds back whitespace until visible text shows up
struct HeldFragments<'a, S: ?Sized> {
    inner: &'a mut S,
    pending: String,
    forwarded: String,
}

impl<'a, S: FragmentSink + ?Sized> HeldFragments<'a, S> {
    fn new(inner: &'a mut S) -> Self {
        Self {
            inner,
            pending: String::new(),
            forwarded: String::new(),
        }
    }
}

impl<'a, S: FragmentSink + ?Sized> FragmentSink for HeldFragments<'a, S> {
    fn accept(&mut self, fragment: &str) {
        if self.forwarded.is_empty() {
            self.pending.push_str(fragment);
            if self.pending.trim().is_empty() {
                return;
            }
            let first = std::mem::take(&mut self.pending);
            self.inner.accept(&first);
            self.forwarded = first;
            return;
        }
        self.inner.accept(fragment);
        self.forwarded.push_str(fragment);
    }
}
