//! Bounded set of pending worker invocations.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FuturesUnordered, StreamExt};
use pin_project_lite::pin_project;

pin_project! {
    /// A pending invocation tagged with the input position of its item.
    ///
    /// The tag is bookkeeping only; it never influences delivery order.
    struct Tracked<Fut> {
        position: usize,
        #[pin]
        fut: Fut,
    }
}

impl<Fut: Future> Future for Tracked<Fut> {
    type Output = (usize, Fut::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let position = *this.position;
        this.fut.poll(cx).map(|out| (position, out))
    }
}

/// Up to `capacity` pending invocations, resolved in completion order.
///
/// Waiting is a single `FuturesUnordered` poll: only invocations that were
/// woken get polled again, so there is no busy loop over the whole set.
pub struct InFlightSet<Fut> {
    pending: FuturesUnordered<Tracked<Fut>>,
    capacity: NonZeroUsize,
}

impl<Fut> InFlightSet<Fut> {
    /// Create an empty set holding at most `capacity` invocations.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            pending: FuturesUnordered::new(),
            capacity,
        }
    }

    /// Maximum number of simultaneous invocations.
    pub const fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of invocations started and not yet completed.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True when another invocation may be admitted without exceeding capacity.
    pub fn has_free_slot(&self) -> bool {
        self.pending.len() < self.capacity.get()
    }

    /// Insert an invocation into a free slot.
    ///
    /// Callers must check [`has_free_slot`](Self::has_free_slot) first.
    pub fn admit(&mut self, position: usize, fut: Fut) {
        debug_assert!(self.has_free_slot(), "in-flight set over capacity");
        self.pending.push(Tracked { position, fut });
    }
}

impl<Fut: Future> InFlightSet<Fut> {
    /// Poll for whichever invocation completes next.
    ///
    /// Returns `Ready(None)` when the set is empty. The completed entry is
    /// removed before its output is returned, freeing its slot.
    pub fn poll_completed(&mut self, cx: &mut Context<'_>) -> Poll<Option<(usize, Fut::Output)>> {
        self.pending.poll_next_unpin(cx)
    }
}
