//! Observation hooks for scheduler activity.
//!
//! Observers receive every admission and completion as it happens on the
//! scheduler's control loop. They are the supported way to verify the
//! concurrency bound from tests or to feed metrics, without scraping logs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Lifecycle event emitted by a running stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// An item was pulled from the input and its worker invocation started.
    Admitted {
        /// Zero-based input position of the item.
        position: usize,
    },
    /// A worker invocation completed and its result was emitted.
    Completed {
        /// Zero-based input position of the item.
        position: usize,
        /// Whether the worker returned `Ok`.
        succeeded: bool,
    },
    /// Input exhausted and in-flight set empty; the stream has ended.
    Drained {
        /// Number of results emitted over the stream's lifetime.
        total: usize,
    },
    /// The stream was dropped while invocations were still pending.
    Abandoned {
        /// Invocations cancelled by the drop.
        in_flight: usize,
    },
}

/// Receiver of scheduler events.
///
/// Called synchronously from the stream's `poll_next`, so implementations
/// must be cheap and must not block.
pub trait SchedulerObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &SchedulerEvent);
}

/// Statistics about scheduler utilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Invocations started.
    pub admitted: u64,
    /// Invocations that completed with `Ok`.
    pub completed: u64,
    /// Invocations that completed with `Err`.
    pub failed: u64,
    /// Invocations started and not yet completed or cancelled.
    pub in_flight: u64,
    /// Highest `in_flight` value observed.
    pub peak_in_flight: u64,
    /// Invocations cancelled because the stream was dropped.
    pub abandoned: u64,
}

/// Lock-free counters tracking concurrency across one or more streams.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    admitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    abandoned: AtomicU64,
}

impl ConcurrencyGauge {
    /// Create a gauge with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            admitted: self.admitted.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
            abandoned: self.abandoned.load(Ordering::Acquire),
        }
    }

    fn raise_peak(&self, current: u64) {
        let mut peak = self.peak_in_flight.load(Ordering::Acquire);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
    }
}

impl SchedulerObserver for ConcurrencyGauge {
    fn on_event(&self, event: &SchedulerEvent) {
        match *event {
            SchedulerEvent::Admitted { .. } => {
                self.admitted.fetch_add(1, Ordering::AcqRel);
                let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                self.raise_peak(current);
            }
            SchedulerEvent::Completed { succeeded, .. } => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                if succeeded {
                    self.completed.fetch_add(1, Ordering::AcqRel);
                } else {
                    self.failed.fetch_add(1, Ordering::AcqRel);
                }
            }
            SchedulerEvent::Abandoned { in_flight } => {
                let n = in_flight as u64;
                self.in_flight.fetch_sub(n, Ordering::AcqRel);
                self.abandoned.fetch_add(n, Ordering::AcqRel);
            }
            SchedulerEvent::Drained { .. } => {}
        }
    }
}

/// Timestamped event record kept by [`InMemoryEventLog`].
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// The event itself.
    pub event: SchedulerEvent,
    /// When the scheduler emitted it.
    pub at: Instant,
}

/// In-memory event log for testing and dev.
pub struct InMemoryEventLog {
    events: Mutex<VecDeque<EventRecord>>,
    max_events: usize,
}

impl InMemoryEventLog {
    /// Create a new in-memory log with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().iter().map(|r| r.event).collect()
    }

    /// Retrieve stored events with their timestamps.
    pub fn records(&self) -> Vec<EventRecord> {
        self.events.lock().iter().cloned().collect()
    }

    /// Positions in the order their results were emitted.
    pub fn completion_order(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|r| match r.event {
                SchedulerEvent::Completed { position, .. } => Some(position),
                _ => None,
            })
            .collect()
    }
}

impl SchedulerObserver for InMemoryEventLog {
    fn on_event(&self, event: &SchedulerEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(EventRecord {
            event: *event,
            at: Instant::now(),
        });
    }
}

/// Fan-out observer forwarding every event to each member in order.
#[derive(Default, Clone)]
pub struct ObserverSet {
    members: Vec<Arc<dyn SchedulerObserver>>,
}

impl ObserverSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer to the set.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn SchedulerObserver>) -> Self {
        self.members.push(observer);
        self
    }

    /// Number of member observers.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl SchedulerObserver for ObserverSet {
    fn on_event(&self, event: &SchedulerEvent) {
        for member in &self.members {
            member.on_event(event);
        }
    }
}
