#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::continuation::ContinuationAllocationResult;
#[cfg(feature = "metrics")]
use crate::ring::{DequeueResult, EnqueueResult};

/// Optional performance counters for the task queue.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct Metrics {
    /// Task records accepted by enqueue calls.
    pub tasks_enqueued: AtomicU64,
    /// Tasks executed through the dequeue-and-run paths.
    pub tasks_executed: AtomicU64,
    /// Enqueue attempts that lost the ring lock.
    pub enqueue_contested: AtomicU64,
    /// Enqueue attempts refused for lack of space.
    pub enqueue_full: AtomicU64,
    /// Dequeue attempts that lost the ring lock.
    pub dequeue_contested: AtomicU64,
    /// Dequeue attempts that found no published work.
    pub dequeue_empty: AtomicU64,
    /// Dequeue attempts that observed the stop sentinel.
    pub dequeue_stop: AtomicU64,
    /// Continuations successfully allocated.
    pub continuations_allocated: AtomicU64,
    /// Continuation allocation attempts that lost the table lock.
    pub continuation_contested: AtomicU64,
    /// Continuation allocation attempts refused because every slot was live.
    pub continuation_full: AtomicU64,
    /// Time when metrics collection started.
    pub start_time: Instant,
}

#[cfg(feature = "metrics")]
impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_enqueued: AtomicU64::new(0),
            tasks_executed: AtomicU64::new(0),
            enqueue_contested: AtomicU64::new(0),
            enqueue_full: AtomicU64::new(0),
            dequeue_contested: AtomicU64::new(0),
            dequeue_empty: AtomicU64::new(0),
            dequeue_stop: AtomicU64::new(0),
            continuations_allocated: AtomicU64::new(0),
            continuation_contested: AtomicU64::new(0),
            continuation_full: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_enqueue(&self, result: &EnqueueResult, batch_len: usize) {
        match result {
            EnqueueResult::Success => {
                self.tasks_enqueued
                    .fetch_add(batch_len as u64, Ordering::Relaxed);
            }
            EnqueueResult::Contested => {
                self.enqueue_contested.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueResult::Full => {
                self.enqueue_full.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_dequeue(&self, result: &DequeueResult) {
        match result {
            DequeueResult::Success(_) => {}
            DequeueResult::Contested => {
                self.dequeue_contested.fetch_add(1, Ordering::Relaxed);
            }
            DequeueResult::Empty => {
                self.dequeue_empty.fetch_add(1, Ordering::Relaxed);
            }
            DequeueResult::Stop => {
                self.dequeue_stop.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_task_executed(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_continuation_allocation(&self, result: &ContinuationAllocationResult) {
        match result {
            ContinuationAllocationResult::Success(_) => {
                self.continuations_allocated.fetch_add(1, Ordering::Relaxed);
            }
            ContinuationAllocationResult::Contested => {
                self.continuation_contested.fetch_add(1, Ordering::Relaxed);
            }
            ContinuationAllocationResult::Full => {
                self.continuation_full.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns a snapshot of current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            enqueue_contested: self.enqueue_contested.load(Ordering::Relaxed),
            enqueue_full: self.enqueue_full.load(Ordering::Relaxed),
            dequeue_contested: self.dequeue_contested.load(Ordering::Relaxed),
            dequeue_empty: self.dequeue_empty.load(Ordering::Relaxed),
            dequeue_stop: self.dequeue_stop.load(Ordering::Relaxed),
            continuations_allocated: self.continuations_allocated.load(Ordering::Relaxed),
            continuation_contested: self.continuation_contested.load(Ordering::Relaxed),
            continuation_full: self.continuation_full.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(feature = "metrics")]
impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// Snapshot of the counters at a point in time.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub tasks_enqueued: u64,
    pub tasks_executed: u64,
    pub enqueue_contested: u64,
    pub enqueue_full: u64,
    pub dequeue_contested: u64,
    pub dequeue_empty: u64,
    pub dequeue_stop: u64,
    pub continuations_allocated: u64,
    pub continuation_contested: u64,
    pub continuation_full: u64,
    pub elapsed_seconds: f64,
}

#[cfg(feature = "metrics")]
impl MetricsSnapshot {
    /// Tasks executed per second since collection started.
    pub fn tasks_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.tasks_executed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Approximate number of enqueued tasks not yet executed.
    pub fn approximate_backlog(&self) -> i64 {
        self.tasks_enqueued as i64 - self.tasks_executed as i64
    }
}
