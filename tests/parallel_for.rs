use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskring::{BufferPool, TaskQueue, WorkerPool};

fn write_index(task_id: i32, context: *mut c_void, _worker_index: i32) {
    // Context points at the base of an output array indexed from 10.
    let out = context as *mut i32;
    unsafe { *out.add((task_id - 10) as usize) = task_id };
}

fn mark_iteration(task_id: i32, context: *mut c_void, _worker_index: i32) {
    let counts = unsafe { &*(context as *const Vec<AtomicUsize>) };
    counts[task_id as usize].fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_range_is_written_in_full() {
    let pool = Arc::new(BufferPool::new());
    let queue = Arc::new(TaskQueue::with_capacities(16, 8, pool));
    let workers = WorkerPool::new(Arc::clone(&queue), 2);

    let mut out = [0i32; 5];
    queue.for_blocking(write_index, out.as_mut_ptr() as *mut c_void, 10, 15, 2);

    assert_eq!(out, [10, 11, 12, 13, 14]);
    workers.shutdown().expect("Shutdown failed");
}

#[test]
fn test_range_is_written_without_any_workers() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(16, 8, pool);

    let mut out = [0i32; 5];
    queue.for_blocking(write_index, out.as_mut_ptr() as *mut c_void, 10, 15, 0);

    assert_eq!(out, [10, 11, 12, 13, 14]);
}

/// A one-slot ring and a lone caller: every iteration still runs, through the
/// full-ring inline fallback.
#[test]
fn test_single_worker_with_one_slot_ring() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(1, 8, pool);
    assert_eq!(queue.task_capacity(), 1);

    let counts: Vec<AtomicUsize> = (0..4).map(|_| AtomicUsize::new(0)).collect();
    queue.for_blocking(mark_iteration, &counts as *const _ as *mut c_void, 0, 4, 0);

    for count in &counts {
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_eight_iterations_through_one_slot_ring() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(1, 8, pool);

    let counts: Vec<AtomicUsize> = (0..8).map(|_| AtomicUsize::new(0)).collect();
    queue.for_blocking(mark_iteration, &counts as *const _ as *mut c_void, 0, 8, 0);

    for count in &counts {
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

/// Every index in the range runs exactly once, no matter how the iterations
/// are split between the caller and the workers.
#[test]
fn test_each_iteration_runs_exactly_once() {
    let pool = Arc::new(BufferPool::new());
    let queue = Arc::new(TaskQueue::with_capacities(64, 16, pool));
    let workers = WorkerPool::new(Arc::clone(&queue), 3);

    let counts: Vec<AtomicUsize> = (0..500).map(|_| AtomicUsize::new(0)).collect();
    queue.for_blocking(mark_iteration, &counts as *const _ as *mut c_void, 0, 500, 3);

    for (i, count) in counts.iter().enumerate() {
        assert_eq!(count.load(Ordering::SeqCst), 1, "iteration {} miscounted", i);
    }
    workers.shutdown().expect("Shutdown failed");
}

#[test]
fn test_consecutive_for_loops_share_the_queue() {
    let pool = Arc::new(BufferPool::new());
    let queue = Arc::new(TaskQueue::with_capacities(32, 8, pool));
    let workers = WorkerPool::new(Arc::clone(&queue), 2);

    for _ in 0..20 {
        let counts: Vec<AtomicUsize> = (0..33).map(|_| AtomicUsize::new(0)).collect();
        queue.for_blocking(mark_iteration, &counts as *const _ as *mut c_void, 0, 33, 2);
        assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    }
    workers.shutdown().expect("Shutdown failed");
}
