//! HTTP server for chorusd

use crate::backend::{GenerationBackend, OllamaBackend};
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::metrics::PipelineMetrics;
use crate::pipeline::Pipeline;
use crate::routes;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub cache: Arc<ResponseCache>,
    pub metrics: Arc<PipelineMetrics>,
    pub start_time: Instant,
    pub max_body_bytes: usize,
    pub prune_interval: Duration,
}

impl AppState {
    /// State backed by the Ollama server named in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = OllamaBackend::new(
            &config.backend.ollama_url,
            config.backend.request_timeout(),
        )
        .context("Failed to create Ollama client")?;
        info!("Using Ollama at {}", backend.base_url());
        Self::new(config, Arc::new(backend))
    }

    /// State backed by any generation backend
    pub fn new(config: &Config, backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        let cache = Arc::new(ResponseCache::new(config.cache.capacity));
        let metrics = Arc::new(PipelineMetrics::new().context("Failed to register metrics")?);
        let pipeline = Arc::new(Pipeline::new(
            config,
            backend,
            Arc::clone(&cache),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            pipeline,
            cache,
            metrics,
            start_time: Instant::now(),
            max_body_bytes: config.server.max_body_bytes,
            prune_interval: config.cache.prune_interval(),
        })
    }
}

/// Build the router with every route and layer
pub fn router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .merge(routes::answer_routes())
        .merge(routes::health_routes())
        .merge(routes::metrics_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until ctrl-c
pub async fn run(state: AppState, bind: &str) -> Result<()> {
    let state = Arc::new(state);
    let pruner = state.cache.spawn_pruner(state.prune_interval);
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pruner.abort();
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down gracefully"),
        Err(e) => {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
