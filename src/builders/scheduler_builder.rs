//! Builders to construct schedulers and their collaborators from configuration.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{FetchScheduler, InMemoryEventLog, SchedulerError, SchedulerObserver};

/// Build a scheduler from validated configuration.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] if the configuration is invalid.
pub fn build_scheduler(
    cfg: &SchedulerConfig,
    observer: Option<Arc<dyn SchedulerObserver>>,
) -> Result<FetchScheduler, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let scheduler = FetchScheduler::new(cfg.max_concurrency)?.with_name(cfg.name.clone());
    let scheduler = match observer {
        Some(observer) => scheduler.with_observer(observer),
        None => scheduler,
    };
    tracing::debug!(
        scheduler = %cfg.name,
        max_concurrency = cfg.max_concurrency,
        "built scheduler"
    );
    Ok(scheduler)
}

/// Build the bounded in-memory event log, or `None` when disabled.
pub fn build_event_log(cfg: &SchedulerConfig) -> Option<Arc<InMemoryEventLog>> {
    (cfg.event_log_capacity > 0).then(|| Arc::new(InMemoryEventLog::new(cfg.event_log_capacity)))
}

/// Build a spawner that owns a runtime sized by `worker_threads`.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] if the configuration is invalid
/// or the runtime cannot be started.
#[cfg(feature = "tokio-runtime")]
pub fn build_spawner(cfg: &SchedulerConfig) -> Result<crate::runtime::TokioSpawner, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;
    crate::runtime::TokioSpawner::with_worker_threads(cfg.worker_threads)
        .map_err(|e| SchedulerError::InvalidConfig(format!("runtime start failed: {e}")))
}
