//! Bounded-concurrency scheduler and its completion-ordered output stream.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::executor::{block_on_stream, BlockingStream};
use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream};
use uuid::Uuid;

use crate::core::{InFlightSet, ItemWorker, SchedulerError, SchedulerEvent, SchedulerObserver};

const DEFAULT_NAME: &str = "fetch";

/// Factory for throttled streams sharing one concurrency bound.
///
/// The scheduler itself holds no per-run state; every call to
/// [`stream`](Self::stream) returns an independent [`Throttled`] that owns its
/// in-flight set. `K` is fixed here and cannot change afterwards.
#[derive(Clone)]
pub struct FetchScheduler {
    limit: NonZeroUsize,
    name: Arc<str>,
    observer: Option<Arc<dyn SchedulerObserver>>,
}

impl FetchScheduler {
    /// Create a scheduler admitting at most `max_concurrency` invocations.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConcurrency`] when `max_concurrency` is 0.
    pub fn new(max_concurrency: usize) -> Result<Self, SchedulerError> {
        NonZeroUsize::new(max_concurrency)
            .map(Self::with_limit)
            .ok_or(SchedulerError::InvalidConcurrency(max_concurrency))
    }

    /// Create a scheduler from a bound that is already known to be non-zero.
    #[must_use]
    pub fn with_limit(limit: NonZeroUsize) -> Self {
        Self {
            limit,
            name: Arc::from(DEFAULT_NAME),
            observer: None,
        }
    }

    /// Label used in tracing fields.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    /// Attach an observer receiving every admission and completion.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SchedulerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The concurrency bound `K`.
    pub const fn max_concurrency(&self) -> usize {
        self.limit.get()
    }

    /// Scheduler label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stream `worker(item)` results for every item, at most `K` at a time.
    ///
    /// Nothing is pulled from `items` until the returned stream is polled.
    /// Results arrive in completion order; an `Err` from the worker is emitted
    /// like any other result and the remaining items keep running.
    pub fn stream<T, W, Fut, O, E>(&self, items: T, worker: W) -> Throttled<T::IntoIter, W, Fut>
    where
        T: IntoIterator,
        W: FnMut(T::Item) -> Fut,
        Fut: Future<Output = Result<O, E>>,
    {
        self.stream_in_run(items, worker, Uuid::new_v4())
    }

    fn stream_in_run<T, W, Fut>(&self, items: T, worker: W, run_id: Uuid) -> Throttled<T::IntoIter, W, Fut>
    where
        T: IntoIterator,
        W: FnMut(T::Item) -> Fut,
        Fut: Future,
    {
        Throttled {
            input: Some(items.into_iter()),
            worker,
            in_flight: InFlightSet::new(self.limit),
            next_position: 0,
            emitted: 0,
            done: false,
            name: Arc::clone(&self.name),
            run_id,
            observer: self.observer.clone(),
        }
    }

    /// Same as [`stream`](Self::stream), driving an [`ItemWorker`] implementation.
    pub fn stream_with<T, X, O, E>(
        &self,
        items: T,
        worker: X,
    ) -> Throttled<
        T::IntoIter,
        impl FnMut(T::Item) -> BoxFuture<'static, Result<O, E>>,
        BoxFuture<'static, Result<O, E>>,
    >
    where
        T: IntoIterator,
        T::Item: Send + 'static,
        X: ItemWorker<T::Item, O, E>,
        O: Send + 'static,
        E: Send + 'static,
    {
        self.stream(items, move |item| {
            let worker = worker.clone();
            Box::pin(async move { worker.execute(item).await }) as BoxFuture<'static, Result<O, E>>
        })
    }

    /// Same as [`stream`](Self::stream), running each invocation as a tokio task.
    ///
    /// Invocations keep making progress on the runtime's worker threads while
    /// the consumer is busy between polls. Dropping the stream aborts every
    /// task still in flight. A task that ends without a result (runtime
    /// shutdown) is reported as [`SchedulerError::WorkerAborted`].
    #[cfg(feature = "tokio-runtime")]
    pub fn spawn_stream<T, W, Fut, O, E>(
        &self,
        items: T,
        mut worker: W,
        spawner: &crate::runtime::TokioSpawner,
    ) -> Throttled<
        T::IntoIter,
        impl FnMut(T::Item) -> crate::runtime::SpawnedInvocation<O, E>,
        crate::runtime::SpawnedInvocation<O, E>,
    >
    where
        T: IntoIterator,
        W: FnMut(T::Item) -> Fut,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Send + 'static,
        E: From<SchedulerError> + Send + 'static,
    {
        let spawner = spawner.clone();
        let name = Arc::clone(&self.name);
        let run_id = Uuid::new_v4();
        // Admission is strictly sequential, so this mirrors the stream's positions.
        let mut position = 0;
        self.stream_in_run(
            items,
            move |item| {
                let invocation = spawner
                    .spawn_invocation(position, worker(item))
                    .in_run(Arc::clone(&name), run_id);
                position += 1;
                invocation
            },
            run_id,
        )
    }
}

/// Completion-ordered stream of worker results with at most `K` in flight.
///
/// Created by [`FetchScheduler::stream`]. Each poll first refills free slots
/// from the input, then waits for any in-flight invocation to finish. The
/// stream ends once the input is exhausted and the in-flight set is empty.
///
/// Dropping the stream drops every pending invocation.
pub struct Throttled<It, W, Fut> {
    input: Option<It>,
    worker: W,
    in_flight: InFlightSet<Fut>,
    next_position: usize,
    emitted: usize,
    done: bool,
    name: Arc<str>,
    run_id: Uuid,
    observer: Option<Arc<dyn SchedulerObserver>>,
}

// Fields are never structurally pinned; pending futures are boxed.
impl<It, W, Fut> Unpin for Throttled<It, W, Fut> {}

impl<It, W, Fut> Throttled<It, W, Fut> {
    /// Invocations started and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Items pulled from the input so far.
    pub const fn admitted(&self) -> usize {
        self.next_position
    }

    /// Results emitted so far.
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    /// True once the stream has returned `None`.
    pub const fn is_drained(&self) -> bool {
        self.done
    }

    /// Identifier of this run, as it appears in tracing output.
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn notify(&self, event: &SchedulerEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }
}

impl<It, W, Fut, O, E> Throttled<It, W, Fut>
where
    It: Iterator,
    W: FnMut(It::Item) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    /// Pull items into free slots until the set is full or the input runs dry.
    fn fill_slots(&mut self) {
        while self.in_flight.has_free_slot() {
            let Some(item) = self.input.as_mut().and_then(Iterator::next) else {
                if self.input.take().is_some() {
                    tracing::debug!(
                        scheduler = %self.name,
                        run = %self.run_id,
                        total = self.next_position,
                        "input exhausted"
                    );
                }
                break;
            };

            let position = self.next_position;
            self.next_position += 1;
            let fut = (self.worker)(item);
            self.in_flight.admit(position, fut);
            tracing::debug!(
                scheduler = %self.name,
                run = %self.run_id,
                position,
                in_flight = self.in_flight.len(),
                "admitted item"
            );
            self.notify(&SchedulerEvent::Admitted { position });
        }
    }

    /// Block the current thread on each result in turn.
    ///
    /// Suitable for workers that do not depend on a runtime reactor; use the
    /// async stream inside tokio.
    pub fn into_blocking_iter(self) -> BlockingStream<Self> {
        block_on_stream(self)
    }
}

impl<It, W, Fut, O, E> Stream for Throttled<It, W, Fut>
where
    It: Iterator,
    W: FnMut(It::Item) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    type Item = Result<O, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        this.fill_slots();

        match this.in_flight.poll_completed(cx) {
            Poll::Ready(Some((position, result))) => {
                this.emitted += 1;
                let succeeded = result.is_ok();
                if succeeded {
                    tracing::debug!(
                        scheduler = %this.name,
                        run = %this.run_id,
                        position,
                        in_flight = this.in_flight.len(),
                        "item completed"
                    );
                } else {
                    tracing::warn!(
                        scheduler = %this.name,
                        run = %this.run_id,
                        position,
                        in_flight = this.in_flight.len(),
                        "item failed"
                    );
                }
                this.notify(&SchedulerEvent::Completed { position, succeeded });
                Poll::Ready(Some(result))
            }
            // Empty right after a refill means the input is exhausted too.
            Poll::Ready(None) => {
                this.done = true;
                tracing::info!(
                    scheduler = %this.name,
                    run = %this.run_id,
                    total = this.emitted,
                    "stream drained"
                );
                this.notify(&SchedulerEvent::Drained { total: this.emitted });
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let pending = self.in_flight.len();
        match &self.input {
            Some(input) => {
                let (lower, upper) = input.size_hint();
                (
                    pending.saturating_add(lower),
                    upper.and_then(|u| u.checked_add(pending)),
                )
            }
            None => (pending, Some(pending)),
        }
    }
}

impl<It, W, Fut, O, E> FusedStream for Throttled<It, W, Fut>
where
    It: Iterator,
    W: FnMut(It::Item) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<It, W, Fut> Drop for Throttled<It, W, Fut> {
    fn drop(&mut self) {
        let in_flight = self.in_flight.len();
        if in_flight > 0 {
            tracing::debug!(
                scheduler = %self.name,
                run = %self.run_id,
                in_flight,
                "stream dropped, cancelling in-flight invocations"
            );
            self.notify(&SchedulerEvent::Abandoned { in_flight });
        }
    }
}
