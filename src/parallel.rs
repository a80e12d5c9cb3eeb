//! Parallel-for primitives built on wrapped tasks.
//!
//! `for_blocking` distributes a range across the workers: one wrapped task
//! per iteration except iteration zero, which runs inline on the calling
//! thread, whose completion is implicit in the continuation's task count.
//! While waiting, the caller steals and runs queued tasks instead of idling,
//! and a full ring is handled by executing pending iterations in place, so a
//! single-threaded caller always makes progress.

use std::ffi::c_void;

use crossbeam::utils::Backoff;

use crate::continuation::{run_wrapped_task, WrappedTaskContext};
use crate::handle::ContinuationHandle;
use crate::pool::Buffer;
use crate::queue::TaskQueue;
use crate::ring::{DequeueResult, EnqueueResult};
use crate::task::{Task, TaskFunction};

impl TaskQueue {
    /// Enqueues one plain task per index in `[inclusive_start,
    /// exclusive_end)`, all sharing `function` and `context`, without
    /// tracking completion. Spins until the ring accepts the batch.
    pub fn enqueue_for(
        &self,
        function: TaskFunction,
        context: *mut c_void,
        inclusive_start: i32,
        exclusive_end: i32,
    ) {
        if exclusive_end <= inclusive_start {
            return;
        }
        let iteration_count = (exclusive_end - inclusive_start) as usize;
        let mut staged: Buffer<Task> = self.pool().take(iteration_count);
        for i in 0..iteration_count {
            unsafe {
                staged
                    .slot(i)
                    .write(Task::new(function, context, inclusive_start + i as i32));
            }
        }
        self.enqueue(unsafe { staged.as_slice() });
        self.pool().return_buffer(&mut staged);
    }

    /// Enqueues one wrapped task per index in `[inclusive_start,
    /// exclusive_end)` under a freshly allocated continuation and returns its
    /// handle for completion polling.
    ///
    /// `wrapped_contexts` must hold at least one element per iteration and
    /// stay alive until the continuation completes.
    pub fn enqueue_wrapped_for(
        &self,
        function: TaskFunction,
        context: *mut c_void,
        inclusive_start: i32,
        exclusive_end: i32,
        wrapped_contexts: &mut [WrappedTaskContext],
    ) -> ContinuationHandle {
        if exclusive_end <= inclusive_start {
            return ContinuationHandle::null();
        }
        let iteration_count = (exclusive_end - inclusive_start) as usize;
        debug_assert!(wrapped_contexts.len() >= iteration_count);
        let handle =
            self.allocate_continuation(iteration_count as i32, 0, None, std::ptr::null_mut());
        let table = self.continuation_table();
        let mut staged: Buffer<Task> = self.pool().take(iteration_count);
        for i in 0..iteration_count {
            wrapped_contexts[i] = WrappedTaskContext::new(function, context, handle, table);
            unsafe {
                staged.slot(i).write(Task::new(
                    run_wrapped_task,
                    &mut wrapped_contexts[i] as *mut WrappedTaskContext as *mut c_void,
                    inclusive_start + i as i32,
                ));
            }
        }
        self.enqueue(unsafe { staged.as_slice() });
        self.pool().return_buffer(&mut staged);
        handle
    }

    /// Runs `function` once for every index in `[inclusive_start,
    /// exclusive_end)` and returns when all iterations have completed.
    ///
    /// Iteration `inclusive_start` runs inline on the calling thread; the
    /// rest are posted as wrapped tasks for the workers. If the ring is full,
    /// the caller executes pending iterations itself; while waiting, it
    /// steals queued tasks. Wrapped-task scratch storage is taken from the
    /// pool and returned once the wait loop exits.
    pub fn for_blocking(
        &self,
        function: TaskFunction,
        context: *mut c_void,
        inclusive_start: i32,
        exclusive_end: i32,
        worker_index: i32,
    ) {
        if exclusive_end <= inclusive_start {
            return;
        }
        let iteration_count = (exclusive_end - inclusive_start) as usize;
        if iteration_count == 1 {
            function(inclusive_start, context, worker_index);
            return;
        }

        let wrapped_count = iteration_count - 1;
        let mut wrapped: Buffer<WrappedTaskContext> = self.pool().take(wrapped_count);
        let mut staged: Buffer<Task> = self.pool().take(wrapped_count);
        let handle = self.allocate_continuation(wrapped_count as i32, 0, None, std::ptr::null_mut());
        let table = self.continuation_table();
        for i in 0..wrapped_count {
            unsafe {
                wrapped
                    .slot(i)
                    .write(WrappedTaskContext::new(function, context, handle, table));
                staged.slot(i).write(Task::new(
                    run_wrapped_task,
                    wrapped.slot(i) as *mut c_void,
                    inclusive_start + 1 + i as i32,
                ));
            }
        }

        let mut pending: &[Task] = unsafe { staged.as_slice() };
        let backoff = Backoff::new();
        while !pending.is_empty() {
            match self.try_enqueue(pending) {
                EnqueueResult::Success => break,
                EnqueueResult::Contested => backoff.snooze(),
                EnqueueResult::Full => {
                    // Running one pending iteration in place both frees a
                    // slot's worth of pressure and guarantees progress when
                    // this thread is the only consumer.
                    let task = pending[0];
                    pending = &pending[1..];
                    task.run(worker_index);
                    backoff.reset();
                }
            }
        }

        function(inclusive_start, context, worker_index);

        let backoff = Backoff::new();
        while !self.is_complete(handle) {
            match self.try_dequeue_and_run(worker_index) {
                DequeueResult::Success(_) => backoff.reset(),
                DequeueResult::Empty | DequeueResult::Contested => backoff.snooze(),
                DequeueResult::Stop => {
                    debug_assert!(
                        false,
                        "the queue was stopped before an in-flight for loop completed"
                    );
                    break;
                }
            }
        }

        self.pool().return_buffer(&mut wrapped);
        self.pool().return_buffer(&mut staged);
    }
}
