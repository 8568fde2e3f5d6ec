//! Prometheus metrics for the answer pipeline

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;

/// How a request's final answer was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Fast path: heuristic pick without judging
    Shortcut,
    /// Judge and synthesis both succeeded
    Synthesized,
    /// Judge failed, heuristic pick used
    JudgeFallback,
    /// Synthesis failed, top-ranked candidate used
    SynthesisFallback,
    /// Streamed synthesis broke after partial output
    SynthesisPartial,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Shortcut => "shortcut",
            Decision::Synthesized => "synthesized",
            Decision::JudgeFallback => "judge_fallback",
            Decision::SynthesisFallback => "synthesis_fallback",
            Decision::SynthesisPartial => "synthesis_partial",
        }
    }
}

/// Pipeline metrics for Prometheus
#[derive(Clone)]
pub struct PipelineMetrics {
    pub requests_total: IntCounterVec,
    pub cache_lookups_total: IntCounterVec,
    pub backend_calls_total: IntCounterVec,
    pub decisions_total: IntCounterVec,
    pub pipeline_duration_seconds: HistogramVec,

    registry: Arc<Registry>,
}

impl PipelineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = register_int_counter_vec_with_registry!(
            "chorus_requests_total",
            "Answer requests by mode and outcome",
            &["mode", "outcome"],
            registry
        )?;

        let cache_lookups_total = register_int_counter_vec_with_registry!(
            "chorus_cache_lookups_total",
            "Response cache lookups by mode and result",
            &["mode", "result"],
            registry
        )?;

        let backend_calls_total = register_int_counter_vec_with_registry!(
            "chorus_backend_calls_total",
            "Fan-out backend calls by provider and result",
            &["provider", "result"],
            registry
        )?;

        let decisions_total = register_int_counter_vec_with_registry!(
            "chorus_decisions_total",
            "Selection decisions by mode and path",
            &["mode", "path"],
            registry
        )?;

        let pipeline_duration_seconds = register_histogram_vec_with_registry!(
            "chorus_pipeline_duration_seconds",
            "Time to produce a final answer in seconds",
            &["mode"],
            vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 45.0, 120.0],
            registry
        )?;

        Ok(Self {
            requests_total,
            cache_lookups_total,
            backend_calls_total,
            decisions_total,
            pipeline_duration_seconds,
            registry: Arc::new(registry),
        })
    }

    /// Record a finished request; outcome is "ok", "cached" or an error label
    pub fn record_request(&self, mode: &str, outcome: &str) {
        self.requests_total.with_label_values(&[mode, outcome]).inc();
    }

    pub fn record_cache_lookup(&self, mode: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[mode, result])
            .inc();
    }

    /// Record one fan-out call; result is "ok" or a failure label
    pub fn record_backend_call(&self, provider: &str, result: &str) {
        self.backend_calls_total
            .with_label_values(&[provider, result])
            .inc();
    }

    pub fn record_decision(&self, mode: &str, decision: Decision) {
        self.decisions_total
            .with_label_values(&[mode, decision.as_str()])
            .inc();
    }

    pub fn observe_duration(&self, mode: &str, seconds: f64) {
        self.pipeline_duration_seconds
            .with_label_values(&[mode])
            .observe(seconds);
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PipelineMetrics::new().unwrap();
        assert_eq!(
            metrics.requests_total.with_label_values(&["fast", "ok"]).get(),
            0
        );
    }

    #[test]
    fn test_record_and_export() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_request("fast", "ok");
        metrics.record_cache_lookup("fast", true);
        metrics.record_backend_call("qwen2.5", "timeout");
        metrics.record_decision("quality", Decision::JudgeFallback);
        metrics.observe_duration("fast", 0.2);

        let text = metrics.export().unwrap();
        assert!(text.contains("chorus_requests_total{mode=\"fast\",outcome=\"ok\"} 1"));
        assert!(text.contains("chorus_cache_lookups_total{mode=\"fast\",result=\"hit\"} 1"));
        assert!(text.contains("provider=\"qwen2.5\",result=\"timeout\""));
        assert!(text.contains("path=\"judge_fallback\""));
        assert!(text.contains("chorus_pipeline_duration_seconds_count{mode=\"fast\"} 1"));
    }

    #[test]
    fn test_separate_registries() {
        // Each instance owns its registry, so two can coexist
        let a = PipelineMetrics::new().unwrap();
        let b = PipelineMetrics::new().unwrap();
        a.record_request("fast", "ok");
        assert_eq!(b.requests_total.with_label_values(&["fast", "ok"]).get(), 0);
    }
}
