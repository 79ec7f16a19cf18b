//! Tokio runtime spawner implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::runtime::{Handle, Runtime, TryCurrentError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::SchedulerError;

/// Tokio-based spawner that executes invocations on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
    /// Present when this spawner built and owns its runtime.
    owned: Option<Arc<Runtime>>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Spawner for the runtime the caller is currently running on.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime context.
    pub fn from_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }

    /// Create a `TokioSpawner` with a new multi-threaded runtime with specified worker threads.
    ///
    /// The runtime lives as long as the last clone of this spawner. Drop it
    /// from synchronous code; tokio refuses to drop a runtime inside another
    /// runtime's async context.
    ///
    /// # Errors
    ///
    /// Propagates the I/O error if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("fetch-worker")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(runtime)),
        })
    }

    /// Runtime handle used for spawning.
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True when this spawner owns its runtime.
    pub const fn owns_runtime(&self) -> bool {
        self.owned.is_some()
    }

    /// Run a future to completion on this spawner's runtime from synchronous code.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }

    /// Spawn one worker invocation for the item at `position`.
    pub fn spawn_invocation<Fut, O, E>(&self, position: usize, fut: Fut) -> SpawnedInvocation<O, E>
    where
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Send + 'static,
        E: Send + 'static,
    {
        SpawnedInvocation {
            position,
            run: None,
            handle: self.handle.spawn(fut),
        }
    }
}

/// A worker invocation running as a tokio task.
///
/// Resolves to the task's result. Dropping it aborts the task, so an abandoned
/// stream never leaves tasks running behind it.
#[derive(Debug)]
pub struct SpawnedInvocation<O, E> {
    position: usize,
    /// Scheduler name and run id for log correlation.
    run: Option<(Arc<str>, Uuid)>,
    handle: JoinHandle<Result<O, E>>,
}

impl<O, E> SpawnedInvocation<O, E> {
    /// Input position of the item this task is processing.
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Tag this invocation with the scheduler run it belongs to.
    #[must_use]
    pub fn in_run(mut self, scheduler: Arc<str>, run_id: Uuid) -> Self {
        self.run = Some((scheduler, run_id));
        self
    }
}

impl<O, E> Future for SpawnedInvocation<O, E>
where
    E: From<SchedulerError>,
{
    type Output = Result<O, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Poll::Ready(Err(err)) => {
                match &this.run {
                    Some((scheduler, run)) => tracing::error!(
                        scheduler = %scheduler,
                        run = %run,
                        position = this.position,
                        "spawned invocation aborted: {err}"
                    ),
                    None => tracing::error!(position = this.position, "spawned invocation aborted: {err}"),
                }
                Poll::Ready(Err(E::from(SchedulerError::WorkerAborted {
                    position: this.position,
                    reason: err.to_string(),
                })))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<O, E> Drop for SpawnedInvocation<O, E> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
