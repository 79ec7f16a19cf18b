//! # Prometheus Fetch Scheduler
//!
//! A bounded-concurrency streaming scheduler for I/O-bound fetch workloads.
//!
//! The scheduler takes a lazily produced sequence of work items and a per-item
//! asynchronous worker, keeps at most `K` worker invocations in flight, and
//! streams each result back the moment its invocation completes. Delivery is in
//! **completion order**, so a slow straggler never blocks the fast items queued
//! behind it.
//!
//! ## Core Problem Solved
//!
//! Fetch-heavy agents (crawlers, model downloaders, tool fan-out) need to:
//!
//! - **Throttle**: never hold more than `K` connections or requests open at once
//! - **Stream**: hand results to the caller as they arrive, not as a batch
//! - **Stay lazy**: pull inputs only when a slot frees up, so unbounded sources work
//! - **Isolate failures**: one failed item must not take the rest of the batch down
//! - **Tear down promptly**: abandoning the stream cancels everything still pending
//!
//! ## Key Features
//!
//! - **Pull-based**: no work starts until the stream is polled
//! - **Bounded in-flight set**: the `≤ K` invariant holds at every instant
//! - **Completion-order delivery** via `FuturesUnordered`, with no polling loops
//! - **Two execution styles**: inline futures, or tokio tasks with abort-on-drop
//! - **Injectable observers**: count admissions and completions without parsing logs
//!
//! ## Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use prometheus_fetch_scheduler::core::FetchScheduler;
//!
//! let scheduler = FetchScheduler::new(3)?;
//! let mut pages = scheduler.stream(urls, |url| async move { fetch(url).await });
//!
//! while let Some(page) = pages.next().await {
//!     match page {
//!         Ok(body) => println!("{} bytes", body.len()),
//!         Err(e) => eprintln!("fetch failed: {e}"),
//!     }
//! }
//! ```
//!
//! ## Running invocations as tokio tasks
//!
//! ```rust,ignore
//! use prometheus_fetch_scheduler::runtime::TokioSpawner;
//!
//! let spawner = TokioSpawner::from_current()?;
//! let results: Vec<_> = scheduler
//!     .spawn_stream(urls, |url| async move { fetch(url).await }, &spawner)
//!     .collect()
//!     .await;
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - Scheduler contract and scenario tests
//! - `tests/spawned_test.rs` - Tokio task execution and cancellation

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling: the throttled stream, in-flight set, and observers.
pub mod core;
/// Configuration models for schedulers.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Runtime adapters for executing invocations as runtime tasks.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
