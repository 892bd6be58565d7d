use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/schedule.sqlite")
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait before retry `n` is `n * backoff_step_ms`.
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

impl RetryConfig {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_step_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub remove_source: bool,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            remove_source: false,
            include_globs: default_include_globs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.xer".to_string(), "**/*.XER".to_string()]
}

impl Config {
    /// All defaults; used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.db.path = path;
        self
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }

    match config.logging.format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Unknown logging.format: '{}'. Must be text or json.", other),
    }

    match config.logging.level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!(
            "Unknown logging.level: '{}'. Must be trace, debug, info, warn, or error.",
            other
        ),
    }

    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must not be empty");
    }

    Ok(())
}
