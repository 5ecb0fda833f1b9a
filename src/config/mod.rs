//! Configuration management for sync-core
//!
//! This module handles loading, parsing, and validating configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::planner::IncrementalMode;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Outbound HTTP client configuration
    #[serde(default)]
    pub http: HttpClientConfig,

    /// Retry and backoff configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch executor configuration
    #[serde(default)]
    pub batch: BatchConfig,

    /// GraphQL endpoint configuration
    #[serde(default)]
    pub graphql: GraphQLConfig,

    /// Incremental sync policy
    #[serde(default)]
    pub incremental: IncrementalSyncConfig,

    /// Sync state persistence
    #[serde(default)]
    pub state: StateConfig,

    /// Periodic sync scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix SYNC_CORE_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(workers) = env_parse("SYNC_CORE_BATCH_WORKERS")? {
            config.batch.workers = workers;
        }
        if let Some(interval) = env_parse("SYNC_CORE_BATCH_INTERVAL_MS")? {
            config.batch.interval_ms = interval;
        }
        if let Some(size) = env_parse("SYNC_CORE_BATCH_SIZE")? {
            config.batch.batch_size = size;
        }

        if let Some(attempts) = env_parse("SYNC_CORE_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }

        if let Ok(skip) = std::env::var("SYNC_CORE_HTTP_INSECURE_SKIP_VERIFY") {
            config.http.insecure_skip_verify = skip.parse().unwrap_or(false);
        }

        if let Ok(endpoint) = std::env::var("SYNC_CORE_GRAPHQL_ENDPOINT") {
            config.graphql.endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("SYNC_CORE_GRAPHQL_TOKEN") {
            config.graphql.bearer_token = Some(token);
        }

        if let Ok(mode) = std::env::var("SYNC_CORE_INCREMENTAL_MODE") {
            config.incremental.mode = mode
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("incremental mode: {}", mode)))?;
        }
        if let Some(days) = env_parse("SYNC_CORE_FULL_SYNC_MAX_DAYS")? {
            config.incremental.max_days_between_full = days;
        }

        if let Ok(path) = std::env::var("SYNC_CORE_STATE_PATH") {
            config.state.path = path;
        }

        if let Ok(level) = std::env::var("SYNC_CORE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("SYNC_CORE_LOG_FORMAT") {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.workers == 0 {
            return Err(ConfigError::InvalidValue(
                "batch.workers must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.state.path.trim().is_empty() {
            return Err(ConfigError::MissingRequired("state.path".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("Invalid value for {}: {}", name, value))),
        Err(_) => Ok(None),
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpClientConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum idle pooled connections kept per host
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    /// Maximum simultaneous connections per host
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,

    /// How long an idle pooled connection is kept, in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Skip TLS certificate verification (test environments only)
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
            max_connections_per_host: default_max_connections_per_host(),
            idle_timeout_secs: default_idle_timeout(),
            insecure_skip_verify: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_idle_per_host() -> usize {
    10
}

fn default_max_connections_per_host() -> usize {
    10
}

fn default_idle_timeout() -> u64 {
    90
}

fn default_user_agent() -> String {
    concat!("sync-core/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Retry configuration for outbound calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry, in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single backoff, in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Whether to add jitter to backoff
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// Batch executor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Work queue capacity; does not limit how many requests a batch may hold
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause each worker takes after a request completes, in milliseconds
    #[serde(default = "default_batch_interval")]
    pub interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            interval_ms: default_batch_interval(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_workers() -> usize {
    5
}

fn default_batch_interval() -> u64 {
    100
}

/// GraphQL endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphQLConfig {
    /// GraphQL endpoint URL
    #[serde(default)]
    pub endpoint: String,

    /// Bearer token sent in the Authorization header
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Split submissions larger than this into several array POSTs; 0 disables splitting
    #[serde(default)]
    pub max_documents_per_request: usize,
}

impl Default for GraphQLConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bearer_token: None,
            max_documents_per_request: 0,
        }
    }
}

/// Incremental sync policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncrementalSyncConfig {
    /// Operator mode: enabled, disabled or auto
    #[serde(default)]
    pub mode: IncrementalMode,

    /// Force a full sync once this many days have passed since the last one
    #[serde(default = "default_max_days_between_full")]
    pub max_days_between_full: u32,

    /// Overlap subtracted from the last sync timestamp, in milliseconds
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: i64,
}

impl Default for IncrementalSyncConfig {
    fn default() -> Self {
        Self {
            mode: IncrementalMode::default(),
            max_days_between_full: default_max_days_between_full(),
            buffer_ms: default_buffer_ms(),
        }
    }
}

fn default_max_days_between_full() -> u32 {
    7
}

fn default_buffer_ms() -> i64 {
    5 * 60 * 1000
}

/// Sync state persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateConfig {
    /// Path to the JSON state file
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> String {
    crate::state::DEFAULT_STATE_FILE.to_string()
}

/// Configuration for the periodic sync scheduler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Time between scheduled runs, in seconds
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,

    /// Upper bound of the random delay added to each scheduled run, in seconds
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,

    /// Maximum duration of a single run, in seconds
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            jitter_secs: default_jitter_secs(),
            sync_timeout_secs: default_sync_timeout(),
        }
    }
}

fn default_sync_interval() -> u64 {
    3600
}

fn default_jitter_secs() -> u64 {
    60
}

fn default_sync_timeout() -> u64 {
    1800
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
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
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
