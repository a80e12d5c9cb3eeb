//! # taskring - Bounded Task Queue for Fine-Grained Parallelism
//!
//! A multi-producer / multi-consumer task queue built to drive a fixed pool
//! of worker threads over small compute work items, in the style of a physics
//! engine's inner dispatch loop.
//!
//! ## Architecture
//!
//! Work flows through four cooperating pieces:
//!
//! - **Ring buffer**: a bounded power-of-two ring of task records with
//!   monotonic cursors, serialized by a single-word spin lock
//! - **Continuations**: version-tagged slots counting the remaining tasks of
//!   a logical job, firing a callback when the job finishes
//! - **Workers**: OS threads running the pop-and-run loop until they reach
//!   the stop sentinel
//! - **Parallel-for**: distributes a range across the workers, runs the first
//!   iteration inline, and steals queued work while waiting
//!
//! All backing storage comes from a shared [`BufferPool`] and is returned to
//! it when the queue is disposed.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskring::{BufferPool, TaskQueue, WorkerPool};
//!
//! fn step(task_id: i32, _context: *mut std::ffi::c_void, worker_index: i32) {
//!     println!("iteration {} on worker {}", task_id, worker_index);
//! }
//!
//! let pool = Arc::new(BufferPool::new());
//! let queue = Arc::new(TaskQueue::new(Arc::clone(&pool)));
//! let workers = WorkerPool::new(Arc::clone(&queue), 4);
//!
//! queue.for_blocking(step, std::ptr::null_mut(), 0, 128, 4);
//!
//! workers.shutdown().expect("Shutdown failed");
//! ```

pub mod continuation;
pub mod handle;
pub mod id_pool;
pub mod metrics;
mod parallel;
pub mod pool;
pub mod queue;
pub mod ring;
pub mod task;
pub mod tracing;
pub mod worker;

pub use continuation::{
    CompletionFunction, Continuation, ContinuationAllocationResult, WrappedTaskContext,
};
pub use handle::ContinuationHandle;
pub use pool::{Buffer, BufferPool};
pub use queue::TaskQueue;
pub use ring::{DequeueResult, EnqueueResult};
pub use task::{Task, TaskFunction};
pub use worker::{PinningStrategy, Worker, WorkerPool};

#[cfg(feature = "metrics")]
pub use metrics::{Metrics, MetricsSnapshot};
