//! LLM-as-judge: score every candidate and rank them.

use crate::backend::{BackendError, GenerationBackend};
use chorus_common::Candidate;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write;
use thiserror::Error;
use tokio::time::Instant;

/// First line of every judge prompt
pub const JUDGE_PREAMBLE: &str = "You are a strict evaluator.\n";

/// Highest score the judge can give
pub const MAX_SCORE: u8 = 10;

/// One validated judge verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredCandidate {
    /// Index into the candidate list the judge saw
    pub index: usize,
    pub score: u8,
    pub notes: String,
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("no candidates to judge")]
    NoCandidates,

    #[error("judge call failed: {0}")]
    Backend(#[from] BackendError),

    #[error("judge call exceeded the deadline")]
    Deadline,

    #[error("unparsable judge output: {0}")]
    Parse(String),

    #[error("judge output had no usable scores")]
    NoUsableScores,
}

pub fn build_prompt(prompt: &str, candidates: &[Candidate]) -> String {
    let mut out = String::from(JUDGE_PREAMBLE);
    out.push_str("Score each answer 0-10 for correctness + usefulness. Penalize hallucinations.\n");
    out.push_str(
        "Return ONLY valid JSON array like: [{\"idx\":0,\"score\":7,\"notes\":\"...\"}, ...]\n\n",
    );
    out.push_str("User prompt:\n");
    out.push_str(prompt);
    out.push_str("\n\nAnswers:\n");

    for (i, candidate) in candidates.iter().enumerate() {
        let _ = write!(out, "\n[{}] ({})\n{}\n", i, candidate.provider, candidate.text);
    }
    out
}

/// Parse and validate raw judge output for `count` candidates.
///
/// The first `[` that opens a JSON array of objects is parsed, so prose,
/// bracketed references or code fences around the array are ignored. Entries with a missing or out-of-range index, a repeated
/// index, or no numeric score are dropped. Result is sorted by descending
/// score; ties keep the judge's order.
pub fn parse_scores(raw: &str, count: usize) -> Result<Vec<ScoredCandidate>, JudgeError> {
    let entries = find_score_array(raw)
        .ok_or_else(|| JudgeError::Parse("no JSON array of objects found".to_string()))?;

    let mut seen = HashSet::new();
    let mut scored = Vec::new();

    for entry in &entries {
        let Some(index) = entry.get("idx").and_then(Value::as_u64).map(|i| i as usize) else {
            continue;
        };
        if index >= count || seen.contains(&index) {
            continue;
        }
        let Some(score) = entry.get("score").and_then(Value::as_f64) else {
            continue;
        };
        if !score.is_finite() {
            continue;
        }

        seen.insert(index);
        scored.push(ScoredCandidate {
            index,
            score: score.round().clamp(0.0, MAX_SCORE as f64) as u8,
            notes: entry
                .get("notes")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    if scored.is_empty() {
        return Err(JudgeError::NoUsableScores);
    }

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(scored)
}

/// First JSON array in `raw` whose elements are all objects
fn find_score_array(raw: &str) -> Option<Vec<Value>> {
    raw.match_indices('[').find_map(|(start, _)| {
        let mut values =
            serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Vec<Value>>();
        match values.next() {
            Some(Ok(entries)) if entries.iter().all(Value::is_object) => Some(entries),
            _ => None,
        }
    })
}

/// Ask `model` to score `candidates` and return them ranked
pub async fn judge(
    backend: &dyn GenerationBackend,
    model: &str,
    prompt: &str,
    candidates: &[Candidate],
    deadline: Instant,
) -> Result<Vec<ScoredCandidate>, JudgeError> {
    if candidates.is_empty() {
        return Err(JudgeError::NoCandidates);
    }

    let judge_prompt = build_prompt(prompt, candidates);
    let raw = tokio::time::timeout_at(deadline, backend.generate(model, &judge_prompt))
        .await
        .map_err(|_| JudgeError::Deadline)??;

    parse_scores(&raw, candidates.len())
}
