//! Configuration management for chorusd.
//!
//! Loads settings from /etc/chorus/config.toml or uses defaults. Every field
//! has a default so partial files work.

use crate::registry::BackendDescriptor;
use anyhow::{Context, Result};
use chorus_common::Mode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/chorus/config.toml";

/// Fallback config file path
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/chorus/config.toml";

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Generation backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Upper bound for a single non-streaming call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_ollama_url() -> String {
    crate::backend::ollama::OLLAMA_DEFAULT_URL.to_string()
}

fn default_request_timeout() -> u64 {
    180
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Judge settings. The judge model also performs synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_model")]
    pub model: String,
}

fn default_judge_model() -> String {
    "llama3.2".to_string()
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
        }
    }
}

/// Selection policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Fast mode skips the judge when the two fastest answers differ in
    /// length by less than this many characters
    #[serde(default = "default_length_gap_threshold")]
    pub length_gap_threshold: usize,

    /// Extra newlines a slower candidate needs to replace the current pick
    #[serde(default = "default_newline_margin")]
    pub newline_margin: usize,

    /// Number of ranked candidates handed to synthesis
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_length_gap_threshold() -> usize {
    350
}

fn default_newline_margin() -> usize {
    1
}

fn default_top_k() -> usize {
    2
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            length_gap_threshold: default_length_gap_threshold(),
            newline_margin: default_newline_margin(),
            top_k: default_top_k(),
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_prune_interval() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

impl CacheConfig {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// Per-mode backend set, deadline and cache TTL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub backends: Vec<BackendDescriptor>,
    pub deadline_secs: u64,
    pub cache_ttl_secs: u64,
}

impl ModeConfig {
    pub fn fast() -> Self {
        Self {
            backends: vec![
                BackendDescriptor::model("llama3.2"),
                BackendDescriptor::model("qwen2.5"),
            ],
            deadline_secs: 45,
            cache_ttl_secs: 10 * 60,
        }
    }

    pub fn quality() -> Self {
        Self {
            backends: vec![
                BackendDescriptor::model("llama3.2"),
                BackendDescriptor::model("qwen2.5"),
                BackendDescriptor::model("mistral"),
            ],
            deadline_secs: 120,
            cache_ttl_secs: 30 * 60,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Mode table. A partially written `[modes.<name>]` section keeps that
/// mode's defaults for the fields it leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ModesOverride")]
pub struct ModesConfig {
    pub fast: ModeConfig,
    pub quality: ModeConfig,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            fast: ModeConfig::fast(),
            quality: ModeConfig::quality(),
        }
    }
}

impl ModesConfig {
    pub fn get(&self, mode: Mode) -> &ModeConfig {
        match mode {
            Mode::Fast => &self.fast,
            Mode::Quality => &self.quality,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModeOverride {
    backends: Option<Vec<BackendDescriptor>>,
    deadline_secs: Option<u64>,
    cache_ttl_secs: Option<u64>,
}

impl ModeOverride {
    fn apply(self, base: ModeConfig) -> ModeConfig {
        ModeConfig {
            backends: self.backends.unwrap_or(base.backends),
            deadline_secs: self.deadline_secs.unwrap_or(base.deadline_secs),
            cache_ttl_secs: self.cache_ttl_secs.unwrap_or(base.cache_ttl_secs),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModesOverride {
    #[serde(default)]
    fast: ModeOverride,
    #[serde(default)]
    quality: ModeOverride,
}

impl From<ModesOverride> for ModesConfig {
    fn from(raw: ModesOverride) -> Self {
        Self {
            fast: raw.fast.apply(ModeConfig::fast()),
            quality: raw.quality.apply(ModeConfig::quality()),
        }
    }
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("mode {0} has no backends")]
    NoBackends(Mode),

    #[error("mode {0} needs a deadline above zero")]
    ZeroDeadline(Mode),

    #[error("mode {0} needs a cache TTL above zero")]
    ZeroTtl(Mode),

    #[error("policy.top_k must be at least 1")]
    ZeroTopK,

    #[error("cache.capacity must be at least 1")]
    ZeroCapacity,
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub judge: JudgeConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub modes: ModesConfig,
}

impl Config {
    /// Load config: explicit path if given, otherwise the system paths,
    /// otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load_from_path(Path::new(CONFIG_PATH))
                .or_else(|_| Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH)))
                .unwrap_or_else(|e| {
                    warn!("Config not found, using defaults: {}", e);
                    Config::default()
                }),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for mode in [Mode::Fast, Mode::Quality] {
            let cfg = self.modes.get(mode);
            if cfg.backends.is_empty() {
                return Err(ConfigError::NoBackends(mode));
            }
            if cfg.deadline_secs == 0 {
                return Err(ConfigError::ZeroDeadline(mode));
            }
            if cfg.cache_ttl_secs == 0 {
                return Err(ConfigError::ZeroTtl(mode));
            }
        }
        if self.policy.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
