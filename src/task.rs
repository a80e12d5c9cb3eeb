//! Task records and execution.
//!
//! A task is one scheduled unit of work: a bare function pointer, an opaque
//! context pointer, and a caller-chosen id. The queue copies task records by
//! value and never looks behind the context pointer.

use std::ffi::c_void;
use std::ptr;

/// Signature of every task function: the task id, the opaque context pointer
/// the task was enqueued with, and the index of the worker executing it.
pub type TaskFunction = fn(task_id: i32, context: *mut c_void, worker_index: i32);

/// A unit of work to be executed by a worker.
///
/// A record with no function is the reserved stop sentinel: workers that
/// dequeue it exit their loop, and the sentinel is left in place so every
/// other worker sees it too.
#[derive(Clone, Copy, Debug)]
pub struct Task {
    /// Function to be executed, or `None` for the stop sentinel.
    pub function: Option<TaskFunction>,
    /// Context pointer passed through to the function. Not owned by the queue.
    pub context: *mut c_void,
    /// Caller-chosen identifier passed through to the function.
    pub task_id: i32,
}

// Safety: the queue only copies the record; the caller is responsible for
// making whatever `context` points to safe to touch from the executing worker.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    /// Creates a new task.
    pub fn new(function: TaskFunction, context: *mut c_void, task_id: i32) -> Self {
        Task {
            function: Some(function),
            context,
            task_id,
        }
    }

    /// Creates a task from a function alone, with no context and id 0.
    pub fn from_function(function: TaskFunction) -> Self {
        Task {
            function: Some(function),
            context: ptr::null_mut(),
            task_id: 0,
        }
    }

    /// Creates a stop sentinel.
    pub fn stop() -> Self {
        Task {
            function: None,
            context: ptr::null_mut(),
            task_id: 0,
        }
    }

    /// Returns true if this record is the stop sentinel.
    pub fn is_stop(&self) -> bool {
        self.function.is_none()
    }

    /// Invokes the task function with this record's id and context.
    pub fn run(&self, worker_index: i32) {
        debug_assert!(
            !self.is_stop(),
            "stop sentinels mark the end of the queue and cannot be executed"
        );
        if let Some(function) = self.function {
            function(self.task_id, self.context, worker_index);
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Task::stop()
    }
}
