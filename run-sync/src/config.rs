//! Configuration loading for stride-sync.
//!
//! Configuration is loaded from a TOML file (default: `stride-sync.toml`).

use run_core::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for stride-sync.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Scheduling and retry configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Background worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Scheduling and retry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Attempts per job before it fails permanently (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failed attempt in milliseconds (default: 2000).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Longest delay between attempts in seconds (default: 5 hours).
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// Delay before the first periodic fetch in seconds (default: 30 minutes).
    #[serde(default = "default_fetch_initial_delay_secs")]
    pub fetch_initial_delay_secs: u64,
    /// Period of the fetch job in seconds (default: 30 minutes).
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
}

/// Background worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// How often the queue is polled for due jobs, in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Enable the worker (default: true).
    #[serde(default = "default_worker_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("stride-sync.db")
}

fn default_max_attempts() -> u32 {
    run_core::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_base_ms() -> u64 {
    2000
}

fn default_backoff_cap_secs() -> u64 {
    5 * 60 * 60 // 5 hours
}

fn default_fetch_initial_delay_secs() -> u64 {
    30 * 60
}

fn default_fetch_interval_secs() -> u64 {
    30 * 60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_worker_enabled() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_secs: default_backoff_cap_secs(),
            fetch_initial_delay_secs: default_fetch_initial_delay_secs(),
            fetch_interval_secs: default_fetch_interval_secs(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            enabled: default_worker_enabled(),
        }
    }
}

impl SyncConfig {
    /// Attempt budget and backoff derived from this section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.backoff_base(),
            max_delay: Duration::from_secs(self.backoff_cap_secs),
        }
    }

    /// Base backoff delay as a duration.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Initial delay of the periodic fetch job.
    pub fn fetch_initial_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_initial_delay_secs)
    }

    /// Period of the fetch job.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
