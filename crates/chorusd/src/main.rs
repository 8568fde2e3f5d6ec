//! Chorus Daemon - multi-model answer service

use anyhow::Result;
use chorusd::{server, AppState, Config};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chorusd")]
#[command(about = "Answers prompts by asking several models and merging the results")]
#[command(version)]
struct Args {
    /// Config file (default: /etc/chorus/config.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding server.bind
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chorusd=info,tower_http=info")),
        )
        .init();

    info!("Chorus Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load(args.config.as_deref())?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    info!(
        "Modes: fast={} backends, quality={} backends, judge={}",
        config.modes.fast.backends.len(),
        config.modes.quality.backends.len(),
        config.judge.model
    );

    let state = AppState::from_config(&config)?;
    server::run(state, &bind).await
}
