//! Configuration management for the orchestrator.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with `QHUB_` prefix)
//! 3. .env files
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use qhub_hal::DdSequence;
use serde::{Deserialize, Serialize};

use crate::cache::FileCacheStorage;

/// Complete orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Background job monitoring
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Queue wait heuristic
    #[serde(default)]
    pub queue: QueueConfig,

    /// Image/result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Submission limits and program options
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Job store layout
    #[serde(default)]
    pub store: StoreConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Background monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between two status polls of one job
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Monitors allowed to poll at the same time
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,
}

/// Queue wait estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Estimated seconds per job ahead in the queue
    #[serde(default = "default_seconds_per_pending_job")]
    pub seconds_per_pending_job: u64,
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// `memory` or `file`
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    /// Directory for the `file` backend (default: platform cache dir)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Entry lifetime
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Interval of the expired-entry sweep; 0 disables it
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

/// Submission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_min_shots")]
    pub min_shots: u32,

    #[serde(default = "default_max_shots")]
    pub max_shots: u32,

    /// Shots used when the caller does not choose
    #[serde(default = "default_shots")]
    pub default_shots: u32,

    /// Dynamical decoupling sequence for sampler jobs
    #[serde(default = "default_dd_sequence")]
    pub dd_sequence: String,

    /// Error-mitigation level for estimator jobs
    #[serde(default = "default_resilience_level")]
    pub resilience_level: u8,
}

/// Job store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_shards")]
    pub shards: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (console, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_max_concurrent_polls() -> usize {
    256
}

fn default_seconds_per_pending_job() -> u64 {
    10
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

fn default_min_shots() -> u32 {
    1
}

fn default_max_shots() -> u32 {
    10_000
}

fn default_shots() -> u32 {
    1024
}

fn default_dd_sequence() -> String {
    "XY4".to_string()
}

fn default_resilience_level() -> u8 {
    1
}

fn default_shards() -> usize {
    crate::job_store::DEFAULT_SHARDS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_polls: default_max_concurrent_polls(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            seconds_per_pending_job: default_seconds_per_pending_job(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            directory: None,
            ttl_seconds: default_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            min_shots: default_min_shots(),
            max_shots: default_max_shots(),
            default_shots: default_shots(),
            dd_sequence: default_dd_sequence(),
            resilience_level: default_resilience_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }

    /// Directory used by the file backend.
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(FileCacheStorage::default_dir)
    }
}

impl SubmissionConfig {
    /// Parsed decoupling sequence. Falls back to the default on a bad value,
    /// which [`Config::validate`] rejects up front.
    pub fn dd_sequence(&self) -> DdSequence {
        self.dd_sequence.parse().unwrap_or_default()
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config = serde_yaml_ng::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with the following precedence:
    /// 1. Load .env file if it exists
    /// 2. Load from file if provided
    /// 3. Apply environment variable overrides
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = if let Some(path) = config_file {
            Self::from_file(path)?
        } else {
            Config::default()
        };

        let config = config.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Merge `QHUB_*` environment variables into this configuration.
    pub fn merge_env(self) -> Self {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Merge overrides looked up through `lookup`.
    ///
    /// Only keys that are present override the current values. Values that
    /// fail to parse are ignored.
    pub fn merge_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_into<T: std::str::FromStr>(value: Option<String>, slot: &mut T) {
            if let Some(val) = value.and_then(|v| v.trim().parse().ok()) {
                *slot = val;
            }
        }

        // Monitor
        parse_into(lookup("QHUB_POLL_INTERVAL_MS"), &mut self.monitor.poll_interval_ms);
        parse_into(
            lookup("QHUB_MAX_CONCURRENT_POLLS"),
            &mut self.monitor.max_concurrent_polls,
        );

        // Queue
        parse_into(
            lookup("QHUB_SECONDS_PER_PENDING_JOB"),
            &mut self.queue.seconds_per_pending_job,
        );

        // Cache
        if let Some(v) = lookup("QHUB_CACHE_BACKEND") {
            self.cache.backend = v;
        }
        if let Some(v) = lookup("QHUB_CACHE_DIR") {
            self.cache.directory = Some(PathBuf::from(v));
        }
        parse_into(lookup("QHUB_CACHE_TTL_SECONDS"), &mut self.cache.ttl_seconds);
        parse_into(
            lookup("QHUB_CACHE_SWEEP_INTERVAL_SECONDS"),
            &mut self.cache.sweep_interval_seconds,
        );

        // Submission
        parse_into(lookup("QHUB_MIN_SHOTS"), &mut self.submission.min_shots);
        parse_into(lookup("QHUB_MAX_SHOTS"), &mut self.submission.max_shots);
        parse_into(lookup("QHUB_DEFAULT_SHOTS"), &mut self.submission.default_shots);
        if let Some(v) = lookup("QHUB_DD_SEQUENCE") {
            self.submission.dd_sequence = v;
        }
        parse_into(
            lookup("QHUB_RESILIENCE_LEVEL"),
            &mut self.submission.resilience_level,
        );

        // Store
        parse_into(lookup("QHUB_STORE_SHARDS"), &mut self.store.shards);

        // Logging
        if let Some(v) = lookup("QHUB_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("QHUB_LOG_FORMAT") {
            self.logging.format = v;
        }

        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.monitor.max_concurrent_polls == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_polls must be greater than 0".to_string(),
            ));
        }

        match self.cache.backend.as_str() {
            "memory" | "file" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown cache backend: {other}"
                )));
            }
        }
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "cache ttl_seconds must be greater than 0".to_string(),
            ));
        }

        let s = &self.submission;
        if s.min_shots == 0 || s.min_shots > s.max_shots {
            return Err(ConfigError::ValidationError(format!(
                "Invalid shot range: {}..={}",
                s.min_shots, s.max_shots
            )));
        }
        if !(s.min_shots..=s.max_shots).contains(&s.default_shots) {
            return Err(ConfigError::ValidationError(format!(
                "default_shots {} outside {}..={}",
                s.default_shots, s.min_shots, s.max_shots
            )));
        }
        s.dd_sequence.parse::<DdSequence>().map_err(|_| {
            ConfigError::ValidationError(format!("Unknown DD sequence: {}", s.dd_sequence))
        })?;

        if self.store.shards == 0 {
            return Err(ConfigError::ValidationError(
                "store shards must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {other}"
                )));
            }
        }
        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {other}"
                )));
            }
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
