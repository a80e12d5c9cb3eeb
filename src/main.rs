use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use taskring::{BufferPool, Task, TaskQueue, WorkerPool};

fn count_task(_task_id: i32, context: *mut c_void, _worker_index: i32) {
    let counter = unsafe { &*(context as *const AtomicUsize) };
    counter.fetch_add(1, Ordering::Relaxed);
}

fn sum_iteration(task_id: i32, context: *mut c_void, _worker_index: i32) {
    let sum = unsafe { &*(context as *const AtomicUsize) };
    sum.fetch_add(task_id as usize, Ordering::Relaxed);
}

fn main() {
    println!("taskring - Bounded Task Queue for Fine-Grained Parallelism\n");

    let num_threads = 4;
    let pool = Arc::new(BufferPool::new());
    let queue = Arc::new(TaskQueue::new(Arc::clone(&pool)));
    let workers = WorkerPool::new(Arc::clone(&queue), num_threads);
    println!("Initialized queue with {} worker threads\n", num_threads);

    // Example 1: plain task dispatch
    println!("Example 1: Plain task dispatch");
    let counter = Arc::new(AtomicUsize::new(0));
    let context = Arc::as_ptr(&counter) as *mut c_void;
    let num_tasks = 10_000;

    let start = Instant::now();
    let batch: Vec<Task> = (0..100).map(|i| Task::new(count_task, context, i)).collect();
    for _ in 0..num_tasks / 100 {
        queue.enqueue(&batch);
    }
    while counter.load(Ordering::Relaxed) < num_tasks {
        std::hint::spin_loop();
    }
    let duration = start.elapsed();
    println!("  Executed {} tasks in {:?}", num_tasks, duration);
    println!(
        "  Throughput: {:.2} tasks/second\n",
        num_tasks as f64 / duration.as_secs_f64()
    );

    // Example 2: blocking parallel-for (the caller participates as worker 4)
    println!("Example 2: Parallel-for");
    let sum = AtomicUsize::new(0);
    let range = 100_000;

    let start = Instant::now();
    queue.for_blocking(
        sum_iteration,
        &sum as *const _ as *mut c_void,
        0,
        range,
        num_threads as i32,
    );
    let duration = start.elapsed();

    let expected: usize = (0..range as usize).sum();
    println!("  Summed [0, {}) in {:?}", range, duration);
    println!(
        "  Result: {} (expected: {})\n",
        sum.load(Ordering::Relaxed),
        expected
    );

    println!("Shutting down...");
    match workers.shutdown() {
        Ok(_) => println!("Done!"),
        Err(e) => eprintln!("Shutdown error: {}", e),
    }
}
