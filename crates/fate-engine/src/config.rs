use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fate_retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read executor config '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse executor config '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid executor config: {0}")]
    Invalid(String),
}

/// Executor settings.
///
/// ```toml
/// workers = 8
/// poll-interval-ms = 50
///
/// [store-retry]
/// max-retries = 20
///
/// [step-retry]
/// max-retries = "unlimited"
/// max-wait-ms = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct FateConfig {
    workers: usize,
    store_retry: RetryPolicy,
    step_retry: RetryPolicy,
    poll_interval_ms: u64,
}

impl Default for FateConfig {
    fn default() -> Self {
        let base = RetryPolicy::default();
        Self {
            workers: DEFAULT_WORKERS,
            store_retry: base,
            step_retry: RetryPolicy::unbounded(
                base.start_wait(),
                base.wait_increment(),
                base.max_wait(),
                base.log_interval(),
            ),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl FateConfig {
    /// Size of the worker pool.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Policy for coordination store calls.
    #[must_use]
    pub fn store_retry(&self) -> &RetryPolicy {
        &self.store_retry
    }

    /// Policy for re-running a step that reported a transient error,
    /// including a reservation held by another transaction.
    #[must_use]
    pub fn step_retry(&self) -> &RetryPolicy {
        &self.step_retry
    }

    /// How long idle waits block before re-checking shared state.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    #[must_use]
    pub fn with_step_retry(mut self, policy: RetryPolicy) -> Self {
        self.step_retry = policy;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the settings cannot run an executor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll-interval-ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses settings from TOML text; absent keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"))
    }

    /// Loads settings from `path`, falling back to defaults if the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}
