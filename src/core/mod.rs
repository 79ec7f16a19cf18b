//! Core scheduling: the throttled stream, in-flight set, and observers.

pub mod error;
pub mod in_flight;
pub mod observer;
pub mod scheduler;
pub mod worker;

pub use error::{AppResult, SchedulerError};
pub use in_flight::InFlightSet;
pub use observer::{
    ConcurrencyGauge, EventRecord, InMemoryEventLog, ObserverSet, SchedulerEvent, SchedulerObserver,
    SchedulerStats,
};
pub use scheduler::{FetchScheduler, Throttled};
pub use worker::ItemWorker;
