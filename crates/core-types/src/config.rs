//! TOML-backed configuration for the service and CLI.
//!
//! Resolution order for the config file: explicit path argument, then the
//! `EMBSERVE_CONFIG` environment variable, then `config/embserve.toml`.
//! A missing file is created with defaults so first runs are self-describing.

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{DEFAULT_DIMENSION, DEFAULT_LIMIT};

pub const CONFIG_ENV: &str = "EMBSERVE_CONFIG";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7878";
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 256 * 1024;
/// Smallest frame limit that still fits an error response with its log line.
pub const MIN_MESSAGE_BYTES: usize = 4 * 1024;

static DEFAULT_CONFIG_PATH: Lazy<PathBuf> =
    Lazy::new(|| PathBuf::from("config").join("embserve.toml"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub embeddings: EmbeddingSection,
    pub logging: LoggingSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "embserve".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_addr: String,
    pub max_message_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Per-half dimension D.
    pub dimension: usize,
    /// Snapshot file with node and edge embeddings (`.json` or `.bin`).
    pub snapshot: String,
    pub default_limit: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            snapshot: "data/embeddings.json".into(),
            default_limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    /// Optional log file; empty means stderr only.
    pub file: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
            file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub enabled: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.embeddings.dimension == 0 {
            bail!("embeddings.dimension must be greater than zero");
        }
        if self.embeddings.default_limit == 0 {
            bail!("embeddings.default_limit must be greater than zero");
        }
        if self.server.max_message_bytes < MIN_MESSAGE_BYTES {
            bail!(
                "server.max_message_bytes must be at least {MIN_MESSAGE_BYTES}, got {}",
                self.server.max_message_bytes
            );
        }
        Ok(())
    }
}

/// Where the config lives for this process.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match std::env::var(CONFIG_ENV) {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => DEFAULT_CONFIG_PATH.clone(),
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load the config, writing defaults first if the file does not exist yet.
pub fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig> {
    // A local .env may carry EMBSERVE_CONFIG.
    dotenvy::dotenv().ok();
    let path = resolve_config_path(path);
    if !path.exists() {
        let cfg = AppConfig::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let body = toml::to_string_pretty(&cfg).context("serialize default config")?;
        fs::write(&path, body).with_context(|| format!("write config {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote default config");
        return Ok(cfg);
    }
    load_config(&path)
}
