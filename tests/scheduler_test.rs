//! Integration tests for the throttled fetch stream.
//!
//! These tests validate the scheduler contract end to end:
//! - Exactly one invocation and one result per input item
//! - The concurrency bound holds at every admission
//! - Results arrive in completion order, not submission order
//! - Worker failures are delivered in place without stopping the stream
//! - The stream is lazy and tears down pending work when dropped

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use prometheus_fetch_scheduler::core::{
    ConcurrencyGauge, FetchScheduler, InMemoryEventLog, ItemWorker, ObserverSet, SchedulerEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Worker-side view of concurrency, independent of the scheduler's bookkeeping.
#[derive(Clone, Default)]
struct ConcurrencyProbe {
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    fn enter(&self) -> ProbeGuard {
        self.started.fetch_add(1, Ordering::SeqCst);
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        ProbeGuard {
            probe: self.clone(),
        }
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Leaves the probe when the invocation finishes or is cancelled.
struct ProbeGuard {
    probe: ConcurrencyProbe,
}

impl ProbeGuard {
    fn finish(self) {
        self.probe.finished.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
        self.probe.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Doubles the item after `delay(item)`, recording concurrency on `probe`.
fn delayed_doubler(
    probe: &ConcurrencyProbe,
    delay: impl Fn(u64) -> Duration,
) -> impl FnMut(u64) -> futures::future::BoxFuture<'static, Result<u64, String>> {
    let probe = probe.clone();
    move |item| {
        let probe = probe.clone();
        let wait = delay(item);
        Box::pin(async move {
            let guard = probe.enter();
            tokio::time::sleep(wait).await;
            guard.finish();
            Ok(item * 2)
        })
    }
}

fn sorted(mut values: Vec<u64>) -> Vec<u64> {
    values.sort_unstable();
    values
}

// ============================================================================
// CONTRACT
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenario_a_six_items_three_slots() {
    let gauge = Arc::new(ConcurrencyGauge::new());
    let scheduler = FetchScheduler::new(3).unwrap().with_observer(gauge.clone());
    let probe = ConcurrencyProbe::default();

    // Larger items finish sooner.
    let worker = delayed_doubler(&probe, |item| Duration::from_millis((7 - item) * 20));
    let results: Vec<u64> = scheduler
        .stream(1..=6u64, worker)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(sorted(results), vec![2, 4, 6, 8, 10, 12]);
    assert!(probe.peak() <= 3, "worker saw {} concurrent", probe.peak());
    assert_eq!(probe.started(), 6);

    let stats = gauge.snapshot();
    assert_eq!(stats.admitted, 6);
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.peak_in_flight, 3);
}

#[tokio::test]
async fn test_scenario_b_empty_input() {
    let gauge = Arc::new(ConcurrencyGauge::new());
    let log = Arc::new(InMemoryEventLog::new(16));
    let observers = ObserverSet::new().with(gauge.clone()).with(log.clone());
    let scheduler = FetchScheduler::new(4).unwrap().with_observer(Arc::new(observers));
    let invocations = AtomicUsize::new(0);

    let results: Vec<Result<u64, String>> = scheduler
        .stream(Vec::<u64>::new(), |item| {
            invocations.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(item))
        })
        .collect()
        .await;

    assert!(results.is_empty());
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(gauge.snapshot().admitted, 0);
    assert_eq!(log.events(), vec![SchedulerEvent::Drained { total: 0 }]);
}

#[tokio::test]
async fn test_scenario_c_single_item_wide_limit() {
    let scheduler = FetchScheduler::new(5).unwrap();
    let probe = ConcurrencyProbe::default();
    let worker = delayed_doubler(&probe, |_| Duration::from_millis(1));

    let results: Vec<_> = scheduler.stream(vec![21u64], worker).collect().await;

    assert_eq!(results, vec![Ok(42)]);
    assert_eq!(probe.started(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_d_failure_is_delivered_in_place() {
    let gauge = Arc::new(ConcurrencyGauge::new());
    let scheduler = FetchScheduler::new(2).unwrap().with_observer(gauge.clone());

    let results: Vec<Result<u64, String>> = scheduler
        .stream(1..=5u64, |item| async move {
            tokio::time::sleep(Duration::from_millis(10 * item)).await;
            if item == 3 {
                Err(format!("item {item} unavailable"))
            } else {
                Ok(item)
            }
        })
        .collect()
        .await;

    assert_eq!(results.len(), 5);
    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(failures, vec!["item 3 unavailable"]);
    let successes: Vec<u64> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(sorted(successes), vec![1, 2, 4, 5]);

    let stats = gauge.snapshot();
    assert_eq!(stats.completed, 4);
    assert_eq!(stats.failed, 1);
}

#[test]
fn test_zero_concurrency_rejected_before_any_work() {
    let err = FetchScheduler::new(0).err().unwrap();
    assert_eq!(err.to_string(), "invalid concurrency bound: 0 (must be at least 1)");
}

#[tokio::test]
async fn test_every_item_processed_exactly_once() {
    let scheduler = FetchScheduler::new(4).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let results: Vec<u64> = scheduler
        .stream(0..50u64, |item| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::task::yield_now().await;
                seen.lock().push(item);
                Ok::<_, String>(item)
            }
        })
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(sorted(results), (0..50).collect::<Vec<_>>());
    assert_eq!(sorted(seen.lock().clone()), (0..50).collect::<Vec<_>>());
}

// ============================================================================
// ORDERING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_delivery_follows_completion_order() {
    let log = Arc::new(InMemoryEventLog::new(64));
    let scheduler = FetchScheduler::new(5).unwrap().with_observer(log.clone());
    let probe = ConcurrencyProbe::default();

    // Last submitted finishes first.
    let worker = delayed_doubler(&probe, |item| Duration::from_millis((5 - item) * 30));
    let results: Vec<u64> = scheduler
        .stream(0..5u64, worker)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(results, vec![8, 6, 4, 2, 0]);
    assert_eq!(log.completion_order(), vec![4, 3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_single_slot_is_sequential() {
    let scheduler = FetchScheduler::new(1).unwrap();
    let probe = ConcurrencyProbe::default();

    let worker = delayed_doubler(&probe, |item| Duration::from_millis((5 - item) * 30));
    let results: Vec<u64> = scheduler
        .stream(0..5u64, worker)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(results, vec![0, 2, 4, 6, 8]);
    assert_eq!(probe.peak(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wide_limit_starts_everything_up_front() {
    let log = Arc::new(InMemoryEventLog::new(64));
    let scheduler = FetchScheduler::new(16).unwrap().with_observer(log.clone());
    let probe = ConcurrencyProbe::default();

    let worker = delayed_doubler(&probe, |_| Duration::from_millis(50));
    let mut stream = scheduler.stream(0..6u64, worker);
    let first = stream.next().await;
    assert!(first.is_some());

    // All six were admitted before the first completion.
    let events = log.events();
    let first_completion = events
        .iter()
        .position(|e| matches!(e, SchedulerEvent::Completed { .. }))
        .unwrap();
    assert_eq!(first_completion, 6);
    assert_eq!(probe.peak(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_reruns_produce_same_multiset() {
    let scheduler = FetchScheduler::new(3).unwrap();
    let delays: Vec<u64> = (0..20).map(|_| rand::random_range(1..40)).collect();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let delays = delays.clone();
        let results: Vec<u64> = scheduler
            .stream(0..20u64, move |item| {
                let wait = Duration::from_millis(delays[item as usize]);
                async move {
                    tokio::time::sleep(wait).await;
                    Ok::<_, String>(item * item)
                }
            })
            .map(Result::unwrap)
            .collect()
            .await;
        runs.push(sorted(results));
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].len(), 20);
}

// ============================================================================
// LAZINESS AND TEARDOWN
// ============================================================================

#[tokio::test]
async fn test_input_pulled_only_to_fill_free_slots() {
    let scheduler = FetchScheduler::new(3).unwrap();
    let pulled = AtomicUsize::new(0);

    let items = (0u64..).inspect(|_| {
        pulled.fetch_add(1, Ordering::SeqCst);
    });
    let stream = scheduler.stream(items, |item| futures::future::ready(Ok::<_, String>(item)));
    assert_eq!(pulled.load(Ordering::SeqCst), 0);

    let results: Vec<_> = stream.take(10).collect().await;

    assert_eq!(results.len(), 10);
    // Three on the first poll, then one refill per later poll.
    assert_eq!(pulled.load(Ordering::SeqCst), 12);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_stream_cancels_in_flight_work() {
    let gauge = Arc::new(ConcurrencyGauge::new());
    let scheduler = FetchScheduler::new(2).unwrap().with_observer(gauge.clone());
    let probe = ConcurrencyProbe::default();

    let worker = delayed_doubler(&probe, |item| {
        if item == 0 {
            Duration::from_millis(10)
        } else {
            Duration::from_secs(3600)
        }
    });
    let mut stream = scheduler.stream(0..100u64, worker);

    assert_eq!(stream.next().await, Some(Ok(0)));
    assert_eq!(stream.admitted(), 2);
    assert_eq!(stream.in_flight(), 1);
    drop(stream);

    assert_eq!(probe.started(), 2);
    assert_eq!(probe.finished(), 1);
    assert_eq!(probe.dropped(), 2);

    let stats = gauge.snapshot();
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.in_flight, 0);
}

// ============================================================================
// WORKER TRAIT
// ============================================================================

#[derive(Clone)]
struct LengthWorker {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ItemWorker<String, usize, String> for LengthWorker {
    async fn execute(&self, item: String) -> Result<usize, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if item.is_empty() {
            return Err("empty page".into());
        }
        Ok(item.len())
    }
}

#[tokio::test]
async fn test_item_worker_trait_drives_stream() {
    let scheduler = FetchScheduler::new(2).unwrap();
    let worker = LengthWorker {
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let pages = vec!["google".to_string(), String::new(), "bing".to_string()];

    let results: Vec<Result<usize, String>> = scheduler.stream_with(pages, worker.clone()).collect().await;

    assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
    let mut lengths: Vec<usize> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    lengths.sort_unstable();
    assert_eq!(lengths, vec![4, 6]);
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
}
