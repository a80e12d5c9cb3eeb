//! The task queue: dispatch surface over the ring buffer and the
//! continuation table.
//!
//! The queue is oblivious to the thread pool driving it; every operation is
//! safe to call from any thread, and `worker_index` is passed through to task
//! functions as pure metadata. Non-blocking operations report contention and
//! exhaustion as results; the blocking wrappers spin with cooperative
//! back-off and never touch kernel primitives.

use std::ffi::c_void;
use std::sync::Arc;

use crossbeam::utils::Backoff;

use crate::continuation::{
    run_wrapped_task, CompletionFunction, Continuation, ContinuationAllocationResult,
    ContinuationTable, WrappedTaskContext,
};
use crate::handle::ContinuationHandle;
use crate::pool::BufferPool;
use crate::ring::{DequeueResult, EnqueueResult, TaskRing};
use crate::task::Task;

#[cfg(feature = "metrics")]
use crate::metrics::Metrics;

/// A bounded MPMC task queue with continuation tracking.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use taskring::{BufferPool, Task, TaskQueue};
///
/// fn work(_task_id: i32, _context: *mut std::ffi::c_void, _worker_index: i32) {}
///
/// let pool = Arc::new(BufferPool::new());
/// let queue = TaskQueue::new(Arc::clone(&pool));
/// queue.enqueue(&[Task::from_function(work)]);
/// assert!(queue.dequeue_and_run(0));
/// queue.enqueue_stop();
/// assert!(!queue.dequeue_and_run(0));
/// ```
pub struct TaskQueue {
    ring: TaskRing,
    continuations: ContinuationTable,
    pool: Arc<BufferPool>,
    #[cfg(feature = "metrics")]
    metrics: Metrics,
}

// Safety: the ring and the table serialize all mutation internally; the pool
// is itself thread-safe.
unsafe impl Send for TaskQueue {}
unsafe impl Sync for TaskQueue {}

impl TaskQueue {
    /// Default number of task records the ring holds.
    pub const DEFAULT_TASK_CAPACITY: usize = 1024;
    /// Default number of continuation slots.
    pub const DEFAULT_CONTINUATION_CAPACITY: usize = 256;

    /// Creates a queue with the default capacities. All backing storage comes
    /// from `pool`, and goes back to it on [`dispose`](TaskQueue::dispose) or
    /// drop.
    pub fn new(pool: Arc<BufferPool>) -> Self {
        TaskQueue::with_capacities(
            Self::DEFAULT_TASK_CAPACITY,
            Self::DEFAULT_CONTINUATION_CAPACITY,
            pool,
        )
    }

    /// Creates a queue holding at least `max_task_capacity` task records
    /// (rounded up to a power of two) and exactly
    /// `max_continuation_capacity` continuation slots.
    pub fn with_capacities(
        max_task_capacity: usize,
        max_continuation_capacity: usize,
        pool: Arc<BufferPool>,
    ) -> Self {
        let ring = TaskRing::new(max_task_capacity, &pool);
        let continuations = ContinuationTable::new(max_continuation_capacity, &pool);
        TaskQueue {
            ring,
            continuations,
            pool,
            #[cfg(feature = "metrics")]
            metrics: Metrics::new(),
        }
    }

    pub fn task_capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn continuation_capacity(&self) -> usize {
        self.continuations.capacity()
    }

    /// Approximate number of published, unconsumed task records.
    pub fn approximate_task_count(&self) -> usize {
        self.ring.approximate_task_count()
    }

    /// Approximate number of live continuations.
    pub fn approximate_continuation_count(&self) -> usize {
        self.continuations.live_count()
    }

    pub(crate) fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub(crate) fn continuation_table(&self) -> *const ContinuationTable {
        &self.continuations
    }

    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Attempts to enqueue a batch of tasks. The whole batch is published
    /// atomically on success.
    pub fn try_enqueue(&self, tasks: &[Task]) -> EnqueueResult {
        let result = self.ring.try_enqueue(tasks);
        #[cfg(feature = "metrics")]
        self.metrics.record_enqueue(&result, tasks.len());
        result
    }

    /// Enqueues a batch of tasks, spinning until the ring accepts it.
    ///
    /// `Full` only resolves when some consumer drains the ring; a batch
    /// larger than the ring itself can never be accepted.
    pub fn enqueue(&self, tasks: &[Task]) {
        debug_assert!(
            tasks.len() <= self.task_capacity(),
            "a batch larger than the ring can never be accepted"
        );
        let backoff = Backoff::new();
        loop {
            match self.try_enqueue(tasks) {
                EnqueueResult::Success => return,
                EnqueueResult::Contested | EnqueueResult::Full => backoff.snooze(),
            }
        }
    }

    /// Attempts to enqueue the stop sentinel.
    pub fn try_enqueue_stop(&self) -> EnqueueResult {
        self.try_enqueue(&[Task::stop()])
    }

    /// Enqueues the stop sentinel, spinning until the ring accepts it.
    pub fn enqueue_stop(&self) {
        self.enqueue(&[Task::stop()]);
    }

    /// Attempts to take the next task without running it.
    pub fn try_dequeue(&self) -> DequeueResult {
        let result = self.ring.try_dequeue();
        #[cfg(feature = "metrics")]
        self.metrics.record_dequeue(&result);
        result
    }

    /// Attempts to take the next task and runs it in place. On `Success` the
    /// executed task is returned alongside the result.
    pub fn try_dequeue_and_run(&self, worker_index: i32) -> DequeueResult {
        let result = self.try_dequeue();
        if let DequeueResult::Success(task) = result {
            task.run(worker_index);
            #[cfg(feature = "metrics")]
            self.metrics.record_task_executed();
        }
        result
    }

    /// Takes and runs tasks until one executes or the stop sentinel is
    /// reached. Returns false iff the queue has stopped.
    pub fn dequeue_and_run(&self, worker_index: i32) -> bool {
        let backoff = Backoff::new();
        loop {
            match self.try_dequeue_and_run(worker_index) {
                DequeueResult::Success(_) => return true,
                DequeueResult::Stop => return false,
                DequeueResult::Empty | DequeueResult::Contested => backoff.snooze(),
            }
        }
    }

    /// Attempts to allocate a continuation tracking `task_count` tasks.
    ///
    /// `user_id` and `on_completed_context` are handed back verbatim to
    /// `on_completed` when the final task completes.
    pub fn try_allocate_continuation(
        &self,
        task_count: i32,
        user_id: u64,
        on_completed: Option<CompletionFunction>,
        on_completed_context: *mut c_void,
    ) -> ContinuationAllocationResult {
        let result =
            self.continuations
                .try_allocate(task_count, user_id, on_completed, on_completed_context);
        #[cfg(feature = "metrics")]
        self.metrics.record_continuation_allocation(&result);
        result
    }

    /// Allocates a continuation, spinning until a slot frees up.
    pub fn allocate_continuation(
        &self,
        task_count: i32,
        user_id: u64,
        on_completed: Option<CompletionFunction>,
        on_completed_context: *mut c_void,
    ) -> ContinuationHandle {
        let backoff = Backoff::new();
        loop {
            match self.try_allocate_continuation(
                task_count,
                user_id,
                on_completed,
                on_completed_context,
            ) {
                ContinuationAllocationResult::Success(handle) => return handle,
                ContinuationAllocationResult::Contested | ContinuationAllocationResult::Full => {
                    backoff.snooze()
                }
            }
        }
    }

    /// Whether the job the handle refers to has finished. Monotonic per
    /// handle: once true, stays true.
    pub fn is_complete(&self, handle: ContinuationHandle) -> bool {
        self.continuations.is_complete(handle)
    }

    /// Resolves a handle to its continuation slot. The pointer is valid only
    /// while the slot is live; a null, out-of-range, or stale handle yields
    /// null (and asserts in debug builds).
    pub fn get_continuation(&self, handle: ContinuationHandle) -> *const Continuation {
        self.continuations.get(handle)
    }

    /// Rewrites a batch of source tasks so each one notifies `continuation`
    /// after running.
    ///
    /// `wrapped_contexts` receives the trampoline context of each task and
    /// `out_tasks[i]` comes out pointing into it, so the storage must stay
    /// alive (and in place) until every wrapped task has executed. Source
    /// tasks must not be stop sentinels.
    pub fn create_completion_wrapped_tasks(
        &self,
        continuation: ContinuationHandle,
        source_tasks: &[Task],
        wrapped_contexts: &mut [WrappedTaskContext],
        out_tasks: &mut [Task],
    ) {
        debug_assert!(continuation.initialized());
        debug_assert_eq!(source_tasks.len(), wrapped_contexts.len());
        debug_assert_eq!(source_tasks.len(), out_tasks.len());
        let table = self.continuation_table();
        for i in 0..source_tasks.len() {
            let source = source_tasks[i];
            debug_assert!(!source.is_stop(), "stop sentinels cannot carry a continuation");
            let Some(function) = source.function else {
                out_tasks[i] = Task::stop();
                continue;
            };
            wrapped_contexts[i] =
                WrappedTaskContext::new(function, source.context, continuation, table);
            out_tasks[i] = Task::new(
                run_wrapped_task,
                &mut wrapped_contexts[i] as *mut WrappedTaskContext as *mut c_void,
                source.task_id,
            );
        }
    }

    /// Returns every backing buffer to the pool. The queue must not be used
    /// afterwards; dropping the queue disposes it automatically.
    pub fn dispose(&mut self) {
        let pool = Arc::clone(&self.pool);
        self.ring.dispose(&pool);
        self.continuations.dispose(&pool);
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.dispose();
    }
}
