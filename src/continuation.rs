//! Continuation tracking for groups of tasks.
//!
//! A continuation counts the remaining tasks of one logical job and fires an
//! optional callback when the count reaches zero. Slots live in a
//! fixed-capacity table and are recycled through an id pool; every
//! (re)allocation bumps the slot's version, so handles held past a slot's
//! lifetime are detectably stale rather than dangerous. Allocation and
//! recycling serialize on the table's spin lock; completion checks are
//! lock-free reads.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicUsize, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

use crate::handle::ContinuationHandle;
use crate::id_pool::IdPool;
use crate::pool::{Buffer, BufferPool};
use crate::task::TaskFunction;

/// Signature of a job-completion callback: the user id the continuation was
/// allocated with, its opaque context pointer, and the worker that executed
/// the final task.
pub type CompletionFunction = fn(user_id: u64, context: *mut c_void, worker_index: i32);

/// Bookkeeping for one in-flight job.
pub struct Continuation {
    on_completed: Option<CompletionFunction>,
    on_completed_context: *mut c_void,
    user_id: u64,
    version: AtomicI32,
    remaining_task_counter: AtomicI32,
}

impl Continuation {
    /// Opaque tag handed back to the completion callback.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Number of tasks in the job that have not yet completed.
    pub fn remaining_task_count(&self) -> i32 {
        self.remaining_task_counter.load(Ordering::SeqCst)
    }
}

/// Outcome of a continuation allocation attempt.
#[derive(Clone, Copy, Debug)]
pub enum ContinuationAllocationResult {
    Success(ContinuationHandle),
    /// The table lock was held by another thread; retry is always safe.
    Contested,
    /// Every slot is live. Drains as jobs complete.
    Full,
}

/// Fixed-capacity table of continuation slots.
pub struct ContinuationTable {
    slots: Buffer<Continuation>,
    index_pool: UnsafeCell<IdPool>,
    live_count: AtomicUsize,
    locker: CachePadded<AtomicU32>,
}

// Safety: `index_pool` is only touched while `locker` is held; slot fields
// mutated outside the lock are atomics.
unsafe impl Send for ContinuationTable {}
unsafe impl Sync for ContinuationTable {}

impl ContinuationTable {
    pub fn new(capacity: usize, pool: &BufferPool) -> Self {
        let capacity = capacity.max(1);
        let slots = pool.take::<Continuation>(capacity);
        for i in 0..capacity {
            unsafe {
                slots.slot(i).write(Continuation {
                    on_completed: None,
                    on_completed_context: ptr::null_mut(),
                    user_id: 0,
                    version: AtomicI32::new(0),
                    remaining_task_counter: AtomicI32::new(0),
                });
            }
        }
        ContinuationTable {
            slots,
            index_pool: UnsafeCell::new(IdPool::new(capacity, pool)),
            live_count: AtomicUsize::new(0),
            locker: CachePadded::new(AtomicU32::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of currently live slots. Moves under foot; treat as a hint.
    pub fn live_count(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }

    fn try_lock(&self) -> bool {
        self.locker
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn lock(&self) {
        let backoff = Backoff::new();
        while !self.try_lock() {
            backoff.snooze();
        }
    }

    fn unlock(&self) {
        self.locker.store(0, Ordering::Release);
    }

    /// Attempts to claim a slot for a job of `task_count` tasks.
    ///
    /// On success the slot's version is bumped and baked into the returned
    /// handle. The version becomes visible before the refreshed counter so a
    /// stale handle can never flip back to incomplete.
    pub fn try_allocate(
        &self,
        task_count: i32,
        user_id: u64,
        on_completed: Option<CompletionFunction>,
        on_completed_context: *mut c_void,
    ) -> ContinuationAllocationResult {
        debug_assert!(task_count > 0, "a job tracks at least one task");
        if !self.try_lock() {
            return ContinuationAllocationResult::Contested;
        }
        if self.live_count.load(Ordering::Relaxed) >= self.capacity() {
            self.unlock();
            return ContinuationAllocationResult::Full;
        }
        // Fields are written through the raw slot pointer: stale handles may
        // concurrently hold shared references into this slot for their
        // version checks.
        let handle = unsafe {
            let index = (*self.index_pool.get()).take();
            let slot = self.slots.slot(index as usize);
            let version = (*slot).version.load(Ordering::Relaxed) + 1;
            debug_assert!(version > 0, "continuation slot version wrapped");
            (*slot).on_completed = on_completed;
            (*slot).on_completed_context = on_completed_context;
            (*slot).user_id = user_id;
            (*slot).version.store(version, Ordering::SeqCst);
            (*slot)
                .remaining_task_counter
                .store(task_count, Ordering::SeqCst);
            ContinuationHandle::new(index as u32, version)
        };
        self.live_count.fetch_add(1, Ordering::Relaxed);
        self.unlock();
        ContinuationAllocationResult::Success(handle)
    }

    /// Whether the job the handle refers to has finished.
    ///
    /// Lock-free and monotonic with respect to the handle: once this returns
    /// true for a given handle, it stays true. A null handle is never
    /// complete.
    pub fn is_complete(&self, handle: ContinuationHandle) -> bool {
        if !handle.initialized() || handle.slot_index() >= self.capacity() {
            return false;
        }
        let slot = unsafe { &*self.slots.slot(handle.slot_index()) };
        let version = slot.version.load(Ordering::SeqCst);
        if version != handle.version() {
            return version > handle.version();
        }
        if slot.remaining_task_counter.load(Ordering::SeqCst) <= 0 {
            return true;
        }
        // A racing reallocation can refresh the counter between the two loads
        // above; the slot only counts as incomplete while it still carries
        // the handle's version.
        slot.version.load(Ordering::SeqCst) > handle.version()
    }

    /// Resolves a handle to its slot.
    ///
    /// The pointer is only valid while the slot is live. Returns null (and
    /// asserts in debug builds) when the handle is null, out of range, or
    /// stale.
    pub fn get(&self, handle: ContinuationHandle) -> *const Continuation {
        debug_assert!(handle.initialized(), "null handles refer to no slot");
        debug_assert!(handle.slot_index() < self.capacity());
        if !handle.initialized() || handle.slot_index() >= self.capacity() {
            return ptr::null();
        }
        let slot = unsafe { &*self.slots.slot(handle.slot_index()) };
        let version = slot.version.load(Ordering::SeqCst);
        debug_assert!(
            version == handle.version(),
            "handle refers to a recycled continuation slot"
        );
        if version != handle.version() {
            return ptr::null();
        }
        slot as *const Continuation
    }

    /// Records the completion of one task belonging to the handle's job.
    ///
    /// On the transition to zero remaining tasks, fires the completion
    /// callback (outside the table lock, so it may enqueue more work) and
    /// then recycles the slot.
    pub(crate) fn notify_task_completed(&self, handle: ContinuationHandle, worker_index: i32) {
        debug_assert!(handle.initialized() && handle.slot_index() < self.capacity());
        let slot = unsafe { &*self.slots.slot(handle.slot_index()) };
        debug_assert_eq!(
            slot.version.load(Ordering::Relaxed),
            handle.version(),
            "completion notified on a recycled continuation slot"
        );
        let previous = slot.remaining_task_counter.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(
            previous > 0,
            "the remaining-task counter went negative; was a completion notified twice?"
        );
        if previous == 1 {
            let on_completed = slot.on_completed;
            let context = slot.on_completed_context;
            let user_id = slot.user_id;
            if let Some(function) = on_completed {
                function(user_id, context, worker_index);
            }
            self.lock();
            unsafe { (*self.index_pool.get()).release(handle.slot_index() as i32) };
            self.live_count.fetch_sub(1, Ordering::Relaxed);
            self.unlock();
        }
    }

    /// Returns all backing buffers to the pool.
    pub fn dispose(&mut self, pool: &BufferPool) {
        pool.return_buffer(&mut self.slots);
        self.index_pool.get_mut().dispose(pool);
    }
}

/// Context of a wrapped task: the user function to run plus the continuation
/// to notify afterwards.
///
/// Storage is provided by the caller (the parallel-for uses a pooled scratch
/// buffer) and must stay alive until the wrapped task has executed.
#[derive(Clone, Copy)]
pub struct WrappedTaskContext {
    function: TaskFunction,
    context: *mut c_void,
    continuation: ContinuationHandle,
    table: *const ContinuationTable,
}

// Safety: moves between threads as part of a task record; the table pointer
// outlives every wrapped task by the queue's construction.
unsafe impl Send for WrappedTaskContext {}
unsafe impl Sync for WrappedTaskContext {}

impl WrappedTaskContext {
    pub(crate) fn new(
        function: TaskFunction,
        context: *mut c_void,
        continuation: ContinuationHandle,
        table: *const ContinuationTable,
    ) -> Self {
        WrappedTaskContext {
            function,
            context,
            continuation,
            table,
        }
    }
}

impl Default for WrappedTaskContext {
    fn default() -> Self {
        fn unset(_task_id: i32, _context: *mut c_void, _worker_index: i32) {}
        WrappedTaskContext {
            function: unset,
            context: ptr::null_mut(),
            continuation: ContinuationHandle::null(),
            table: ptr::null(),
        }
    }
}

/// Standard task function of every wrapped task: runs the user function, then
/// decrements the job's remaining counter. Task records store this function's
/// address, so it must never be swapped for another.
pub(crate) fn run_wrapped_task(task_id: i32, context: *mut c_void, worker_index: i32) {
    let wrapped = unsafe { *(context as *const WrappedTaskContext) };
    (wrapped.function)(task_id, wrapped.context, worker_index);
    unsafe { (*wrapped.table).notify_task_completed(wrapped.continuation, worker_index) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn allocate(
        table: &ContinuationTable,
        task_count: i32,
        user_id: u64,
        on_completed: Option<CompletionFunction>,
        context: *mut c_void,
    ) -> ContinuationHandle {
        match table.try_allocate(task_count, user_id, on_completed, context) {
            ContinuationAllocationResult::Success(handle) => handle,
            other => panic!("allocation failed: {:?}", other),
        }
    }

    fn record_user_id(user_id: u64, context: *mut c_void, _worker_index: i32) {
        let seen = unsafe { &*(context as *const AtomicU64) };
        seen.store(user_id, Ordering::SeqCst);
    }

    #[test]
    fn test_counts_down_and_fires_once() {
        let pool = BufferPool::new();
        let mut table = ContinuationTable::new(4, &pool);
        let seen = AtomicU64::new(0);
        let handle = allocate(
            &table,
            3,
            0xDEAD,
            Some(record_user_id),
            &seen as *const _ as *mut c_void,
        );
        assert!(!table.is_complete(handle));

        table.notify_task_completed(handle, 0);
        table.notify_task_completed(handle, 1);
        assert!(!table.is_complete(handle));
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        table.notify_task_completed(handle, 0);
        assert!(table.is_complete(handle));
        assert_eq!(seen.load(Ordering::SeqCst), 0xDEAD);
        assert_eq!(table.live_count(), 0);
        table.dispose(&pool);
    }

    #[test]
    fn test_reallocation_bumps_version() {
        let pool = BufferPool::new();
        let mut table = ContinuationTable::new(1, &pool);
        let first = allocate(&table, 1, 1, None, ptr::null_mut());
        table.notify_task_completed(first, 0);
        assert!(table.is_complete(first));

        let second = allocate(&table, 1, 2, None, ptr::null_mut());
        assert_eq!(second.slot_index(), first.slot_index());
        assert!(second.version() > first.version());
        assert!(table.is_complete(first));
        assert!(!table.is_complete(second));
        table.notify_task_completed(second, 0);
        table.dispose(&pool);
    }

    #[test]
    fn test_full_table_refuses() {
        let pool = BufferPool::new();
        let mut table = ContinuationTable::new(2, &pool);
        let a = allocate(&table, 1, 0, None, ptr::null_mut());
        let _b = allocate(&table, 1, 0, None, ptr::null_mut());
        assert!(matches!(
            table.try_allocate(1, 0, None, ptr::null_mut()),
            ContinuationAllocationResult::Full
        ));
        table.notify_task_completed(a, 0);
        assert!(matches!(
            table.try_allocate(1, 0, None, ptr::null_mut()),
            ContinuationAllocationResult::Success(_)
        ));
        table.dispose(&pool);
    }

    #[test]
    fn test_null_handle_is_never_complete() {
        let pool = BufferPool::new();
        let mut table = ContinuationTable::new(2, &pool);
        assert!(!table.is_complete(ContinuationHandle::null()));
        table.dispose(&pool);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "recycled continuation slot")]
    fn test_get_on_stale_handle_asserts() {
        let pool = BufferPool::new();
        let table = ContinuationTable::new(1, &pool);
        let first = allocate(&table, 1, 1, None, ptr::null_mut());
        table.notify_task_completed(first, 0);
        let _second = allocate(&table, 1, 2, None, ptr::null_mut());
        let _ = table.get(first);
    }
}
