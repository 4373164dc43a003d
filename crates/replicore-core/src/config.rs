//! Configuration module for Replicore.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation and defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ports::remote::ErrorClass;

/// Top-level configuration for the sync engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hydration: HydrationConfig,
    pub retry: RetryConfig,
    pub events: EventsConfig,
}

/// Bulk hydration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    /// Records requested per page.
    pub page_size: u32,
    /// Cap on total records fetched per model type per hydration pass.
    pub max_records: u64,
    /// Model types hydrated in parallel.
    pub concurrency: usize,
    /// Seconds between scheduled hydration passes.
    pub sync_interval_secs: u64,
    /// A hydration bookmark older than this is treated as "never synced"
    /// and forces a full hydration (the remote delta window has expired).
    pub base_sync_interval_secs: u64,
}

/// Mutation retry / backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt ceiling before a recoverable failure becomes terminal.
    pub max_attempts: u32,
    /// Base delay for exponential backoff, milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay, milliseconds.
    pub max_delay_ms: u64,
    /// Fraction of random extra delay added to each backoff (0.0 disables).
    pub jitter_factor: f64,
    /// Error classifications that are worth retrying.
    pub retryable: Vec<ErrorClass>,
}

/// Status event channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Per-subscriber buffer; a lagging subscriber drops the oldest events.
    pub channel_capacity: usize,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hydration.page_size == 0 {
            return Err(ConfigError::new("hydration.page_size must be positive"));
        }
        if self.hydration.concurrency == 0 {
            return Err(ConfigError::new("hydration.concurrency must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::new("retry.max_attempts must be positive"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::new(
                "retry.jitter_factor must be between 0.0 and 1.0",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::new("events.channel_capacity must be positive"));
        }
        Ok(())
    }
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_records: 10_000,
            concurrency: 4,
            sync_interval_secs: 300,
            base_sync_interval_secs: 86_400,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            jitter_factor: 0.25,
            retryable: vec![
                ErrorClass::Network,
                ErrorClass::Throttling,
                ErrorClass::ServiceUnavailable,
            ],
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// A validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid configuration: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
