//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Concurrency bound must admit at least one in-flight invocation.
    #[error("invalid concurrency bound: {0} (must be at least 1)")]
    InvalidConcurrency(usize),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A spawned invocation ended without producing a result.
    #[error("worker for item {position} aborted: {reason}")]
    WorkerAborted {
        /// Input position of the item whose invocation was aborted.
        position: usize,
        /// Runtime-provided reason.
        reason: String,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
