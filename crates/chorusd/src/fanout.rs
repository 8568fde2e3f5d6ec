//! Concurrent fan-out of one prompt to every backend of a mode.

use crate::backend::{BackendError, GenerationBackend};
use crate::registry::BackendDescriptor;
use chorus_common::Candidate;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Instructions placed in front of the user prompt for every backend
pub const ANSWER_PREAMBLE: &str = "Answer the user clearly and directly.\n\
Prefer correct, concise explanations and practical examples when helpful.\n\n";

pub fn answer_prompt(prompt: &str) -> String {
    format!("{}User:\n{}", ANSWER_PREAMBLE, prompt)
}

/// A backend that produced no candidate, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub provider: String,
    pub error: BackendError,
}

/// Outcome of one fan-out round
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    /// Valid candidates, ascending by latency
    pub candidates: Vec<Candidate>,
    pub failures: Vec<BackendFailure>,
}

impl FanOutResult {
    pub fn any_rate_limited(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_rate_limited())
    }
}

/// Call every backend concurrently and gather what finishes before `deadline`.
///
/// Calls still running at the deadline are aborted and reported as timeouts.
pub async fn fan_out(
    backend: Arc<dyn GenerationBackend>,
    descriptors: &[BackendDescriptor],
    prompt: &str,
    deadline: Instant,
) -> FanOutResult {
    let framed = Arc::new(answer_prompt(prompt));
    let mut join_set = JoinSet::new();

    for (index, descriptor) in descriptors.iter().enumerate() {
        let backend = Arc::clone(&backend);
        let model = descriptor.model.clone();
        let framed = Arc::clone(&framed);

        join_set.spawn(async move {
            let started = std::time::Instant::now();
            let result = backend.generate(&model, &framed).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            (index, result, latency_ms)
        });
    }

    let mut finished = vec![false; descriptors.len()];
    let mut result = FanOutResult::default();
    let mut deadline_hit = false;

    loop {
        match tokio::time::timeout_at(deadline, join_set.join_next()).await {
            Ok(Some(Ok((index, outcome, latency_ms)))) => {
                finished[index] = true;
                let provider = descriptors[index].name.clone();
                let outcome = outcome.and_then(|text| {
                    let text = text.trim();
                    if text.is_empty() {
                        Err(BackendError::Empty)
                    } else {
                        Ok(text.to_string())
                    }
                });

                match outcome {
                    Ok(text) => {
                        debug!("{} answered in {}ms", provider, latency_ms);
                        result.candidates.push(Candidate {
                            provider,
                            text,
                            latency_ms,
                        });
                    }
                    Err(error) => {
                        warn!("{} failed: {}", provider, error);
                        result.failures.push(BackendFailure { provider, error });
                    }
                }
            }
            Ok(Some(Err(e))) => warn!("Backend task did not complete: {}", e),
            Ok(None) => break,
            Err(_) => {
                deadline_hit = true;
                join_set.abort_all();
                break;
            }
        }
    }

    for (index, done) in finished.iter().enumerate() {
        if *done {
            continue;
        }
        let provider = descriptors[index].name.clone();
        let error = if deadline_hit {
            BackendError::Timeout
        } else {
            BackendError::Http("backend task aborted".to_string())
        };
        warn!("{} failed: {}", provider, error);
        result.failures.push(BackendFailure { provider, error });
    }

    result.candidates.sort_by_key(|c| c.latency_ms);
    result
}
