//! Output side of the tracker.
//!
//! Completed and lost presents, plus process start/stop notices, accumulate
//! in mutex-guarded queues that a consumer thread drains in batches. The
//! tracker thread only ever pushes; the consumer only ever drains, so each
//! lock is held for a push or a pointer swap.

use std::sync::Mutex;

use crate::present::Present;

/// Multi-producer, single-drainer queue. `drain` swaps the whole backing
/// vector out under the lock instead of popping elements one at a time.
#[derive(Debug)]
pub struct DrainQueue<T> {
    inner: Mutex<Vec<T>>,
}

impl<T> Default for DrainQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DrainQueue<T> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Vec::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            // A poisoned queue still holds valid data; keep going.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, value: T) {
        self.lock().push(value);
    }

    /// Takes every queued value, leaving the queue empty.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// A process appeared in or disappeared from the trace session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessUpdate {
    pub timestamp: u64,
    pub process_id: u32,
    pub image_name: String,
    pub started: bool,
}

/// The queues handed to the consumer. The tracker keeps its own handle and
/// pushes as presents finish.
#[derive(Debug, Default)]
pub struct DeliveryQueues {
    /// Presents that reached a terminal state, in per-swapchain submission
    /// order.
    pub completed: DrainQueue<Present>,
    /// Presents evicted without a terminal state (contradictory events,
    /// ring overflow, or shutdown).
    pub lost: DrainQueue<Present>,
    pub processes: DrainQueue<ProcessUpdate>,
}

impl DeliveryQueues {
    pub fn new() -> Self {
        Self::default()
    }
}
