//! Scheduler configuration structures.

use std::env;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Environment variable holding the scheduler label.
pub const ENV_NAME: &str = "FETCH_SCHEDULER_NAME";
/// Environment variable holding the concurrency bound.
pub const ENV_MAX_CONCURRENCY: &str = "FETCH_MAX_CONCURRENCY";
/// Environment variable holding the worker thread count for owned runtimes.
pub const ENV_WORKER_THREADS: &str = "FETCH_WORKER_THREADS";
/// Environment variable holding the event log capacity.
pub const ENV_EVENT_LOG_CAPACITY: &str = "FETCH_EVENT_LOG_CAPACITY";

fn default_name() -> String {
    "fetch".into()
}

const fn default_max_concurrency() -> usize {
    4
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

const fn default_event_log_capacity() -> usize {
    1024
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Label attached to tracing output.
    #[serde(default = "default_name")]
    pub name: String,
    /// Maximum simultaneously outstanding worker invocations (`K`).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Worker threads for a runtime built by the scheduler itself.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Events retained by the in-memory event log; 0 disables the log.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_concurrency: default_max_concurrency(),
            worker_threads: default_worker_threads(),
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_usize(key: &str) -> Result<Option<usize>, String> {
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| format!("{key}={raw:?} is not a valid count: {e}"))
        })
        .transpose()
}

/// A missing dotenv file is not an error; anything else is.
fn accept_dotenv(loaded: Result<(), dotenvy::Error>) -> Result<(), String> {
    match loaded {
        Ok(()) | Err(dotenvy::Error::Io(_)) => Ok(()),
        Err(e) => Err(format!("invalid .env file: {e}")),
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.worker_threads == 0 {
            return Err("worker_threads must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading scheduler config {}", path.display()))
    }

    /// Build configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present;
    /// variables already set in the environment take precedence over it.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a message for malformed values or an invalid result.
    pub fn from_env() -> Result<Self, String> {
        let loaded = dotenvy::dotenv().map(|path| tracing::debug!("loaded environment from {}", path.display()));
        accept_dotenv(loaded)?;
        Self::from_current_env()
    }

    /// Build configuration from the environment after loading the dotenv file at `path`.
    ///
    /// A missing file is ignored. Variables already set in the environment
    /// take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns a message for an unparsable file, malformed values, or an
    /// invalid result.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let loaded = dotenvy::from_path(path).map(|()| tracing::debug!("loaded environment from {}", path.display()));
        accept_dotenv(loaded)?;
        Self::from_current_env()
    }

    /// Build configuration from variables already present in the environment.
    ///
    /// # Errors
    ///
    /// Returns a message for malformed values or an invalid result.
    pub fn from_current_env() -> Result<Self, String> {
        let mut cfg = Self::default();
        if let Some(name) = env_opt(ENV_NAME) {
            cfg.name = name;
        }
        if let Some(k) = env_usize(ENV_MAX_CONCURRENCY)? {
            cfg.max_concurrency = k;
        }
        if let Some(threads) = env_usize(ENV_WORKER_THREADS)? {
            cfg.worker_threads = threads;
        }
        if let Some(capacity) = env_usize(ENV_EVENT_LOG_CAPACITY)? {
            cfg.event_log_capacity = capacity;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
