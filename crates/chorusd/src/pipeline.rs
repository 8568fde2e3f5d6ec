//! Answer pipeline: cache, fan-out, selection, judge, synthesis.
//!
//! One [`Pipeline`] is shared by every request. A request runs either
//! synchronously ([`Pipeline::answer`]) or with progress reported to a
//! [`SessionSink`] ([`Pipeline::answer_streaming`]); both share the same flow
//! and produce the same final text for the same backend output.

use crate::backend::{FragmentSink, GenerationBackend};
use crate::cache::{cache_key, ResponseCache};
use crate::config::{Config, ModesConfig, PolicyConfig};
use crate::error::PipelineError;
use crate::fanout::fan_out;
use crate::judge::judge;
use crate::metrics::{Decision, PipelineMetrics};
use crate::policy::{heuristic_pick, should_shortcut};
use crate::registry::BackendRegistry;
use crate::synth::{synthesize, synthesize_incremental, SynthesisError};
use chorus_common::{AnswerResponse, Candidate, Query};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Progress notes sent to streaming callers
pub mod status {
    pub const CACHE_HIT: &str = "cache hit";
    pub const RUNNING_MODELS: &str = "running models...";
    pub const FAST_PATH: &str = "fast path (no judge)";
    pub const JUDGING: &str = "judging candidates...";
    pub const JUDGE_FAILED: &str = "judge failed; using best guess";
    pub const SYNTHESIZING: &str = "synthesizing...";
    pub const SYNTH_FAILED: &str = "synth failed; fallback to best candidate";
}

/// Receives progress notes and answer fragments for one request
pub trait SessionSink: FragmentSink {
    fn status(&mut self, text: &str);
}

/// Optional sink wrapper so the synchronous form shares the same flow
struct Progress<'a> {
    sink: Option<&'a mut (dyn SessionSink + 'a)>,
}

impl<'a> Progress<'a> {
    fn status(&mut self, text: &str) {
        if let Some(sink) = self.sink.as_mut() {
            sink.status(text);
        }
    }

    fn delta(&mut self, text: &str) {
        if let Some(sink) = self.sink.as_mut() {
            sink.accept(text);
        }
    }

    fn sink(&mut self) -> Option<&mut (dyn SessionSink + 'a)> {
        self.sink.as_deref_mut()
    }
}

/// Final text plus whether it may be cached
struct Selection {
    text: String,
    cacheable: bool,
}

pub struct Pipeline {
    backend: Arc<dyn GenerationBackend>,
    registry: BackendRegistry,
    modes: ModesConfig,
    policy: PolicyConfig,
    judge_model: String,
    cache: Arc<ResponseCache>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        backend: Arc<dyn GenerationBackend>,
        cache: Arc<ResponseCache>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            backend,
            registry: BackendRegistry::from_config(&config.modes),
            modes: config.modes.clone(),
            policy: config.policy.clone(),
            judge_model: config.judge.model.clone(),
            cache,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Produce the final answer in one piece
    pub async fn answer(&self, query: &Query) -> Result<AnswerResponse, PipelineError> {
        self.execute(query, None).await
    }

    /// Produce the final answer, reporting progress and text fragments to
    /// `sink`. Fragments concatenate to the returned final text.
    pub async fn answer_streaming(
        &self,
        query: &Query,
        sink: &mut dyn SessionSink,
    ) -> Result<AnswerResponse, PipelineError> {
        self.execute(query, Some(sink)).await
    }

    async fn execute(
        &self,
        query: &Query,
        sink: Option<&mut dyn SessionSink>,
    ) -> Result<AnswerResponse, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("answer", %request_id, mode = %query.mode);
        let started = std::time::Instant::now();

        let result = self.run(query, Progress { sink }).instrument(span).await;

        let mode = query.mode.as_str();
        let outcome = match &result {
            Ok(response) if response.cached => "cached",
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        self.metrics.record_request(mode, outcome);
        self.metrics
            .observe_duration(mode, started.elapsed().as_secs_f64());
        result
    }

    async fn run(
        &self,
        query: &Query,
        mut progress: Progress<'_>,
    ) -> Result<AnswerResponse, PipelineError> {
        let mode = query.mode;
        let key = cache_key(mode, &query.prompt);

        if let Some(mut hit) = self.cache.get(&key).await {
            self.metrics.record_cache_lookup(mode.as_str(), true);
            info!("Cache hit");
            hit.cached = true;
            progress.status(status::CACHE_HIT);
            progress.delta(&hit.final_answer);
            return Ok(hit);
        }
        self.metrics.record_cache_lookup(mode.as_str(), false);

        let mode_config = self.modes.get(mode);
        let deadline = Instant::now() + mode_config.deadline();

        progress.status(status::RUNNING_MODELS);
        let round = fan_out(
            Arc::clone(&self.backend),
            self.registry.for_mode(mode),
            &query.prompt,
            deadline,
        )
        .await;

        for candidate in &round.candidates {
            self.metrics.record_backend_call(&candidate.provider, "ok");
        }
        for failure in &round.failures {
            self.metrics
                .record_backend_call(&failure.provider, failure.error.label());
        }

        if round.candidates.is_empty() {
            warn!("No backend produced an answer ({} failed)", round.failures.len());
            return Err(PipelineError::UpstreamUnavailable {
                rate_limited: round.any_rate_limited(),
            });
        }
        debug!("{} candidates", round.candidates.len());
        debug_assert!(
            round.candidates.len() + round.failures.len() == self.registry.count(mode),
            "every backend reports exactly once"
        );

        let candidates = round.candidates;
        let selection = self
            .select(query, &candidates, deadline, &mut progress)
            .await;

        let response = AnswerResponse {
            final_answer: selection.text,
            candidates,
            cached: false,
            mode,
        };

        if selection.cacheable {
            self.cache
                .set(key, response.clone(), mode_config.cache_ttl())
                .await;
        }
        Ok(response)
    }

    /// Pick or synthesize the final text from non-empty `candidates`
    async fn select(
        &self,
        query: &Query,
        candidates: &[Candidate],
        deadline: Instant,
        progress: &mut Progress<'_>,
    ) -> Selection {
        let mode = query.mode;

        if should_shortcut(mode, candidates, &self.policy) {
            info!("Fast path, judge skipped");
            self.metrics.record_decision(mode.as_str(), Decision::Shortcut);
            progress.status(status::FAST_PATH);
            return self.heuristic(candidates, progress);
        }

        progress.status(status::JUDGING);
        let ranked = match judge(
            self.backend.as_ref(),
            &self.judge_model,
            &query.prompt,
            candidates,
            deadline,
        )
        .await
        {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!("Judge failed: {}", e);
                self.metrics
                    .record_decision(mode.as_str(), Decision::JudgeFallback);
                progress.status(status::JUDGE_FAILED);
                return self.heuristic(candidates, progress);
            }
        };

        let top: Vec<&Candidate> = ranked
            .iter()
            .take(self.policy.top_k)
            .map(|scored| &candidates[scored.index])
            .collect();
        debug!(
            "Top candidates: {:?}",
            top.iter().map(|c| c.provider.as_str()).collect::<Vec<_>>()
        );

        progress.status(status::SYNTHESIZING);
        let merged = match progress.sink() {
            Some(sink) => {
                synthesize_incremental(
                    self.backend.as_ref(),
                    &self.judge_model,
                    &query.prompt,
                    &top,
                    deadline,
                    sink,
                )
                .await
            }
            None => {
                synthesize(
                    self.backend.as_ref(),
                    &self.judge_model,
                    &query.prompt,
                    &top,
                    deadline,
                )
                .await
            }
        };

        match merged {
            Ok(text) => {
                self.metrics
                    .record_decision(mode.as_str(), Decision::Synthesized);
                Selection {
                    text,
                    cacheable: true,
                }
            }
            Err(SynthesisError::Interrupted { partial, reason }) => {
                warn!("Synthesis interrupted after partial output: {}", reason);
                self.metrics
                    .record_decision(mode.as_str(), Decision::SynthesisPartial);
                Selection {
                    text: partial,
                    cacheable: false,
                }
            }
            Err(e) => {
                warn!("Synthesis failed: {}", e);
                self.metrics
                    .record_decision(mode.as_str(), Decision::SynthesisFallback);
                progress.status(status::SYNTH_FAILED);
                // top is non-empty: the judge returned at least one entry
                let text = top[0].text.clone();
                progress.delta(&text);
                Selection {
                    text,
                    cacheable: true,
                }
            }
        }
    }

    fn heuristic(&self, candidates: &[Candidate], progress: &mut Progress<'_>) -> Selection {
        let text = heuristic_pick(candidates, &self.policy)
            .map(|c| c.text.clone())
            .unwrap_or_default();
        progress.delta(&text);
        Selection {
            text,
            cacheable: true,
        }
    }
}
