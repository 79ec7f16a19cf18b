//! Worker abstraction for per-item asynchronous operations.

use async_trait::async_trait;

/// Abstraction for processing one work item and producing a result.
///
/// The worker owns the actual business logic of a fetch (transport, decoding,
/// any retries or timeouts). The scheduler only observes when each call
/// completes and whether it returned `Ok` or `Err`.
///
/// Plain closures returning futures can be passed to
/// [`FetchScheduler::stream`](crate::core::FetchScheduler::stream) directly;
/// implement this trait when the worker carries shared state such as a client
/// or connection pool.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_fetch_scheduler::core::ItemWorker;
///
/// #[derive(Clone)]
/// struct PageFetcher {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl ItemWorker<String, String, reqwest::Error> for PageFetcher {
///     async fn execute(&self, url: String) -> Result<String, reqwest::Error> {
///         self.client.get(url).send().await?.text().await
///     }
/// }
/// ```
#[async_trait]
pub trait ItemWorker<I, O, E>: Send + Sync + Clone + 'static
where
    I: Send + 'static,
    O: Send + 'static,
    E: Send + 'static,
{
    /// Process one item.
    ///
    /// Each call is independent; an `Err` is delivered to the consumer in
    /// completion position and does not stop the remaining items.
    async fn execute(&self, item: I) -> Result<O, E>;
}
