//! Builders to construct schedulers from configuration.

pub mod scheduler_builder;

#[cfg(feature = "tokio-runtime")]
pub use scheduler_builder::build_spawner;
pub use scheduler_builder::{build_event_log, build_scheduler};
