//! Bounded power-of-two ring buffer of task records.
//!
//! Three monotonic 64-bit cursors describe the ring: `dequeue` is the next
//! index to hand out, `allocated` is the next index a producer will reserve,
//! and `written` is one past the last index that is safe to read. Producers
//! and consumers serialize on a single-word spin lock acquired with one CAS
//! attempt; contention surfaces as a `Contested` result rather than a spin
//! inside the primitive. `written` is additionally published with release
//! ordering so that lock-free observers (and the matching acquire load on the
//! consumer side) see fully written records.
//!
//! Cursor invariants: `dequeue <= written <= allocated`, and
//! `allocated - dequeue` never exceeds the ring length.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

use crate::pool::{Buffer, BufferPool};
use crate::task::Task;

/// Outcome of a single enqueue attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueResult {
    /// All records were copied in and published.
    Success,
    /// The lock was held by another thread; retry is always safe.
    Contested,
    /// The batch does not fit in the space left ahead of the dequeue cursor.
    Full,
}

/// Outcome of a single dequeue attempt.
#[derive(Clone, Copy, Debug)]
pub enum DequeueResult {
    /// A task was handed out and its slot consumed.
    Success(Task),
    /// The lock was held by another thread; retry is always safe.
    Contested,
    /// No published records remain; more may arrive.
    Empty,
    /// The next record is the stop sentinel. It is left in place so every
    /// other consumer sees it too.
    Stop,
}

pub struct TaskRing {
    tasks: Buffer<Task>,
    mask: u64,
    dequeue_cursor: AtomicU64,
    allocated_cursor: AtomicU64,
    written_cursor: CachePadded<AtomicU64>,
    locker: CachePadded<AtomicU32>,
}

impl TaskRing {
    /// Creates a ring with room for at least `capacity` task records, rounded
    /// up to the next power of two. Backing storage comes from `pool`.
    pub fn new(capacity: usize, pool: &BufferPool) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let tasks = pool.take::<Task>(capacity);
        for i in 0..capacity {
            unsafe { tasks.slot(i).write(Task::stop()) };
        }
        TaskRing {
            tasks,
            mask: capacity as u64 - 1,
            dequeue_cursor: AtomicU64::new(0),
            allocated_cursor: AtomicU64::new(0),
            written_cursor: CachePadded::new(AtomicU64::new(0)),
            locker: CachePadded::new(AtomicU32::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tasks.len()
    }

    /// Approximate number of published, unconsumed records. The cursors can
    /// move while this reads them; treat the result as a hint.
    pub fn approximate_task_count(&self) -> usize {
        let written = self.written_cursor.load(Ordering::Relaxed);
        let dequeue = self.dequeue_cursor.load(Ordering::Relaxed);
        written.saturating_sub(dequeue) as usize
    }

    fn try_lock(&self) -> bool {
        self.locker
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.locker.store(0, Ordering::Release);
    }

    /// Attempts to copy a batch of records into the ring and publish them.
    ///
    /// The whole batch becomes visible atomically: consumers only see records
    /// below the `written` cursor, which is stored last. An empty batch
    /// succeeds without taking the lock.
    pub fn try_enqueue(&self, tasks: &[Task]) -> EnqueueResult {
        if tasks.is_empty() {
            return EnqueueResult::Success;
        }
        if !self.try_lock() {
            return EnqueueResult::Contested;
        }
        #[cfg(debug_assertions)]
        {
            let written = self.written_cursor.load(Ordering::Relaxed);
            if written > 0 {
                let last = unsafe { self.tasks.slot(((written - 1) & self.mask) as usize).read() };
                debug_assert!(
                    !last.is_stop() || tasks.iter().all(Task::is_stop),
                    "tasks cannot be enqueued behind a stop command"
                );
            }
        }
        let start = self.allocated_cursor.load(Ordering::Relaxed);
        let end = start + tasks.len() as u64;
        self.allocated_cursor.store(end, Ordering::Relaxed);
        if end - self.dequeue_cursor.load(Ordering::Relaxed) > self.capacity() as u64 {
            // Roll the reservation back; a refused batch must not burn slots.
            self.allocated_cursor.store(start, Ordering::Relaxed);
            self.unlock();
            return EnqueueResult::Full;
        }
        let wrapped_start = (start & self.mask) as usize;
        let wrapped_end = (end & self.mask) as usize;
        unsafe {
            if wrapped_end > wrapped_start {
                std::ptr::copy_nonoverlapping(
                    tasks.as_ptr(),
                    self.tasks.slot(wrapped_start),
                    tasks.len(),
                );
            } else {
                // The batch wraps; copy the tail of the ring, then the head.
                let first_segment = self.capacity() - wrapped_start;
                std::ptr::copy_nonoverlapping(
                    tasks.as_ptr(),
                    self.tasks.slot(wrapped_start),
                    first_segment,
                );
                std::ptr::copy_nonoverlapping(
                    tasks.as_ptr().add(first_segment),
                    self.tasks.as_mut_ptr(),
                    wrapped_end,
                );
            }
        }
        self.written_cursor.store(end, Ordering::Release);
        self.unlock();
        EnqueueResult::Success
    }

    /// Attempts to hand out the next published record.
    ///
    /// A stop sentinel is reported but never consumed: the dequeue cursor
    /// stays put so every consumer that reaches it sees `Stop`.
    pub fn try_dequeue(&self) -> DequeueResult {
        if !self.try_lock() {
            return DequeueResult::Contested;
        }
        let dequeue = self.dequeue_cursor.load(Ordering::Relaxed);
        if dequeue >= self.written_cursor.load(Ordering::Acquire) {
            self.unlock();
            return DequeueResult::Empty;
        }
        let task = unsafe { self.tasks.slot((dequeue & self.mask) as usize).read() };
        if task.is_stop() {
            self.unlock();
            return DequeueResult::Stop;
        }
        self.dequeue_cursor.store(dequeue + 1, Ordering::Relaxed);
        self.unlock();
        DequeueResult::Success(task)
    }

    /// Returns the backing buffer to the pool.
    pub fn dispose(&mut self, pool: &BufferPool) {
        pool.return_buffer(&mut self.tasks);
    }
}
