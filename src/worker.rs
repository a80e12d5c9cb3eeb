//! Worker thread implementation.
//!
//! Workers are plain OS threads that loop over the shared queue: pop a task,
//! run it, back off briefly when the queue is empty or contested, and exit
//! when the stop sentinel is reached. The queue itself is oblivious to the
//! pool; each worker just passes its index through to the tasks it runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use core_affinity::CoreId;
use crossbeam::utils::Backoff;

use crate::queue::TaskQueue;
use crate::ring::DequeueResult;

/// How worker threads are mapped onto CPU cores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinningStrategy {
    /// No pinning; the OS scheduler places the threads.
    None,
    /// Worker `i` is pinned to core `i`, wrapping around.
    Linear,
    /// Workers are pinned to every other core, skipping SMT siblings.
    AvoidSmt,
}

/// A worker thread executing tasks from a shared queue.
pub struct Worker {
    index: usize,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct WorkerParams {
    pub(crate) index: usize,
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) core_id: Option<CoreId>,
    pub(crate) running_workers: Arc<AtomicUsize>,
}

impl Worker {
    /// Creates and starts a new worker thread.
    pub(crate) fn new(params: WorkerParams) -> Self {
        let index = params.index;
        let handle = thread::spawn(move || {
            if let Some(core_id) = params.core_id {
                core_affinity::set_for_current(core_id);
            }
            Worker::run_loop(params);
        });
        Worker {
            index,
            handle: Some(handle),
        }
    }

    /// Pop-and-run loop: runs until the stop sentinel is reached.
    fn run_loop(params: WorkerParams) {
        let WorkerParams {
            index,
            queue,
            running_workers,
            ..
        } = params;
        running_workers.fetch_add(1, Ordering::Relaxed);
        let worker_index = index as i32;
        let backoff = Backoff::new();
        loop {
            match queue.try_dequeue_and_run(worker_index) {
                DequeueResult::Success(_) => backoff.reset(),
                DequeueResult::Empty | DequeueResult::Contested => backoff.snooze(),
                DequeueResult::Stop => break,
            }
        }
        running_workers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the worker's index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Waits for the worker thread to finish.
    pub fn join(mut self) -> thread::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }
}

/// A fixed pool of worker threads draining a shared task queue.
pub struct WorkerPool {
    workers: Vec<Worker>,
    queue: Arc<TaskQueue>,
    running_workers: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawns `num_threads` unpinned workers over `queue`.
    pub fn new(queue: Arc<TaskQueue>, num_threads: usize) -> Self {
        Self::new_with_strategy(queue, num_threads, PinningStrategy::None)
    }

    /// Spawns workers with optional linear core pinning.
    pub fn new_with_affinity(queue: Arc<TaskQueue>, num_threads: usize, pin_to_core: bool) -> Self {
        Self::new_with_strategy(
            queue,
            num_threads,
            if pin_to_core {
                PinningStrategy::Linear
            } else {
                PinningStrategy::None
            },
        )
    }

    /// Spawns workers with a specific pinning strategy.
    pub fn new_with_strategy(
        queue: Arc<TaskQueue>,
        num_threads: usize,
        strategy: PinningStrategy,
    ) -> Self {
        let core_ids = core_affinity::get_core_ids().unwrap_or_default();
        let mapped_cores: Vec<Option<CoreId>> = match strategy {
            PinningStrategy::None => (0..num_threads).map(|_| None).collect(),
            PinningStrategy::Linear => (0..num_threads)
                .map(|i| core_ids.get(i % core_ids.len().max(1)).copied())
                .collect(),
            PinningStrategy::AvoidSmt => {
                let physical: Vec<CoreId> = core_ids.iter().step_by(2).copied().collect();
                (0..num_threads)
                    .map(|i| physical.get(i % physical.len().max(1)).copied())
                    .collect()
            }
        };

        let running_workers = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(num_threads);
        for index in 0..num_threads {
            workers.push(Worker::new(WorkerParams {
                index,
                queue: Arc::clone(&queue),
                core_id: mapped_cores.get(index).copied().flatten(),
                running_workers: Arc::clone(&running_workers),
            }));
        }

        WorkerPool {
            workers,
            queue,
            running_workers,
        }
    }

    /// Returns the number of worker threads in the pool.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers that have started and not yet observed the stop
    /// sentinel.
    pub fn running_count(&self) -> usize {
        self.running_workers.load(Ordering::Relaxed)
    }

    /// The queue this pool drains.
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Posts the stop sentinel and joins every worker.
    ///
    /// Tasks already in the queue finish first; the sentinel lands behind
    /// them. Returns Err if any worker thread panicked.
    pub fn shutdown(self) -> Result<(), String> {
        self.queue.enqueue_stop();

        let mut failed_count = 0;
        for worker in self.workers {
            let worker_index = worker.index();
            if worker.join().is_err() {
                failed_count += 1;
                eprintln!("Worker {} panicked during execution", worker_index);
            }
        }

        if failed_count > 0 {
            Err(format!("{} worker thread(s) panicked", failed_count))
        } else {
            Ok(())
        }
    }
}
