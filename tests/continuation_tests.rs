use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use taskring::{BufferPool, Task, TaskQueue, WorkerPool, WrappedTaskContext};

fn count_up(_task_id: i32, context: *mut c_void, _worker_index: i32) {
    let counter = unsafe { &*(context as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::SeqCst);
}

struct CompletionRecord {
    fired: AtomicUsize,
    user_id: AtomicU64,
}

fn record_completion(user_id: u64, context: *mut c_void, _worker_index: i32) {
    let record = unsafe { &*(context as *const CompletionRecord) };
    record.fired.fetch_add(1, Ordering::SeqCst);
    record.user_id.store(user_id, Ordering::SeqCst);
}

#[test]
fn test_job_of_three_fires_callback_once() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(8, 4, pool);
    let counter = AtomicUsize::new(0);
    let record = CompletionRecord {
        fired: AtomicUsize::new(0),
        user_id: AtomicU64::new(0),
    };

    let handle = queue.allocate_continuation(
        3,
        0xFEED,
        Some(record_completion),
        &record as *const _ as *mut c_void,
    );
    let sources = [
        Task::new(count_up, &counter as *const _ as *mut c_void, 0),
        Task::new(count_up, &counter as *const _ as *mut c_void, 1),
        Task::new(count_up, &counter as *const _ as *mut c_void, 2),
    ];
    let mut wrapped = [WrappedTaskContext::default(); 3];
    let mut out = [Task::stop(); 3];
    queue.create_completion_wrapped_tasks(handle, &sources, &mut wrapped, &mut out);
    queue.enqueue(&out);

    while !queue.is_complete(handle) {
        assert!(queue.dequeue_and_run(0));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(record.fired.load(Ordering::SeqCst), 1);
    assert_eq!(record.user_id.load(Ordering::SeqCst), 0xFEED);
}

#[test]
fn test_callback_fires_once_under_worker_pool() {
    let pool = Arc::new(BufferPool::new());
    let queue = Arc::new(TaskQueue::with_capacities(64, 8, pool));
    let workers = WorkerPool::new(Arc::clone(&queue), 4);

    let counter = AtomicUsize::new(0);
    let record = CompletionRecord {
        fired: AtomicUsize::new(0),
        user_id: AtomicU64::new(0),
    };

    const TASK_COUNT: usize = 16;
    let handle = queue.allocate_continuation(
        TASK_COUNT as i32,
        42,
        Some(record_completion),
        &record as *const _ as *mut c_void,
    );
    let sources: Vec<Task> = (0..TASK_COUNT as i32)
        .map(|i| Task::new(count_up, &counter as *const _ as *mut c_void, i))
        .collect();
    let mut wrapped = vec![WrappedTaskContext::default(); TASK_COUNT];
    let mut out = vec![Task::stop(); TASK_COUNT];
    queue.create_completion_wrapped_tasks(handle, &sources, &mut wrapped, &mut out);
    queue.enqueue(&out);

    while !queue.is_complete(handle) {
        std::hint::spin_loop();
    }
    workers.shutdown().expect("Shutdown failed");

    assert_eq!(counter.load(Ordering::SeqCst), TASK_COUNT);
    assert_eq!(record.fired.load(Ordering::SeqCst), 1);
    assert_eq!(record.user_id.load(Ordering::SeqCst), 42);
}

#[test]
fn test_slot_reuse_bumps_version_and_stales_old_handle() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(8, 1, pool);
    let counter = AtomicUsize::new(0);
    let context = &counter as *const _ as *mut c_void;

    let first = queue.allocate_continuation(1, 1, None, ptr::null_mut());
    let sources = [Task::new(count_up, context, 0)];
    let mut wrapped = [WrappedTaskContext::default(); 1];
    let mut out = [Task::stop(); 1];
    queue.create_completion_wrapped_tasks(first, &sources, &mut wrapped, &mut out);
    queue.enqueue(&out);
    assert!(queue.dequeue_and_run(0));
    assert!(queue.is_complete(first));

    // The single slot is recycled under a strictly greater version.
    let second = queue.allocate_continuation(1, 2, None, ptr::null_mut());
    assert_eq!(second.slot_index(), first.slot_index());
    assert!(second.version() > first.version());
    assert_ne!(first, second);

    assert!(queue.is_complete(first));
    assert!(!queue.is_complete(second));

    queue.create_completion_wrapped_tasks(second, &sources, &mut wrapped, &mut out);
    queue.enqueue(&out);
    assert!(queue.dequeue_and_run(0));
    assert!(queue.is_complete(second));
}

#[test]
fn test_get_continuation_on_live_handle() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(8, 4, pool);
    let handle = queue.allocate_continuation(2, 0xABCD, None, ptr::null_mut());

    let continuation = queue.get_continuation(handle);
    assert!(!continuation.is_null());
    let continuation = unsafe { &*continuation };
    assert_eq!(continuation.user_id(), 0xABCD);
    assert_eq!(continuation.remaining_task_count(), 2);

    // Drain the job so the queue tears down with no live slots.
    let counter = AtomicUsize::new(0);
    let sources = [
        Task::new(count_up, &counter as *const _ as *mut c_void, 0),
        Task::new(count_up, &counter as *const _ as *mut c_void, 1),
    ];
    let mut wrapped = [WrappedTaskContext::default(); 2];
    let mut out = [Task::stop(); 2];
    queue.create_completion_wrapped_tasks(handle, &sources, &mut wrapped, &mut out);
    queue.enqueue(&out);
    while !queue.is_complete(handle) {
        assert!(queue.dequeue_and_run(0));
    }
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "recycled continuation slot")]
fn test_get_continuation_on_stale_handle_asserts() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(8, 1, pool);
    let counter = AtomicUsize::new(0);
    let context = &counter as *const _ as *mut c_void;

    let first = queue.allocate_continuation(1, 1, None, ptr::null_mut());
    let sources = [Task::new(count_up, context, 0)];
    let mut wrapped = [WrappedTaskContext::default(); 1];
    let mut out = [Task::stop(); 1];
    queue.create_completion_wrapped_tasks(first, &sources, &mut wrapped, &mut out);
    queue.enqueue(&out);
    assert!(queue.dequeue_and_run(0));

    let _second = queue.allocate_continuation(1, 2, None, ptr::null_mut());
    let _ = queue.get_continuation(first);
}
