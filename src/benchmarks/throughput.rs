use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use taskring::{PinningStrategy, Task, TaskQueue};

use crate::utils::{BenchmarkResult, DataPoint, SystemInfo};

fn spin_task(_task_id: i32, context: *mut c_void, _worker_index: i32) {
    let counter = unsafe { &*(context as *const AtomicUsize) };
    // A touch of arithmetic so the task is not pure queue overhead.
    let mut x = 0u64;
    for i in 0..32 {
        x = x.wrapping_add(i * i);
    }
    std::hint::black_box(x);
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Measures raw dispatch throughput: batches of plain tasks pushed through
/// the ring while the workers drain it.
pub fn run_dispatch_throughput_benchmark(
    queue: &Arc<TaskQueue>,
    strategy: PinningStrategy,
    threads: usize,
) -> BenchmarkResult {
    eprintln!("\n=== Benchmark: Dispatch Throughput ===");

    let system_info = SystemInfo::collect(strategy, threads);
    eprintln!(
        "System: {} CPU cores, {:.2} GB total RAM, Strategy: {:?}",
        system_info.cpu_cores, system_info.total_memory_gb, strategy
    );

    let test_sizes = vec![100, 1_000, 10_000, 100_000, 1_000_000];
    const BATCH: usize = 128;

    let mut data_points = Vec::new();
    let mut timed_out = false;
    let total_start = Instant::now();
    let timeout = std::time::Duration::from_secs(crate::utils::DEFAULT_TIMEOUT_SECS);

    for &num_tasks in &test_sizes {
        if total_start.elapsed() > timeout {
            eprintln!(
                "\n! Timeout reached ({}s), stopping benchmark.",
                crate::utils::DEFAULT_TIMEOUT_SECS
            );
            timed_out = true;
            break;
        }

        eprintln!("\nDispatching {} tasks in batches of {}...", num_tasks, BATCH);

        let counter = AtomicUsize::new(0);
        let context = &counter as *const _ as *mut c_void;
        let batch: Vec<Task> = (0..BATCH as i32)
            .map(|i| Task::new(spin_task, context, i))
            .collect();

        let start = Instant::now();
        let mut posted = 0;
        while posted < num_tasks {
            let remaining = num_tasks - posted;
            queue.enqueue(&batch[..remaining.min(BATCH)]);
            posted += remaining.min(BATCH);
        }
        while counter.load(Ordering::Relaxed) < num_tasks {
            std::hint::spin_loop();
        }
        let elapsed = start.elapsed();

        let time_ms = elapsed.as_secs_f64() * 1000.0;
        eprintln!(
            "  {} tasks in {:.3} ms ({:.0} tasks/s)",
            num_tasks,
            time_ms,
            num_tasks as f64 / elapsed.as_secs_f64()
        );
        data_points.push(DataPoint { num_tasks, time_ms });
    }

    BenchmarkResult {
        name: "dispatch_throughput".to_string(),
        data_points,
        system_info,
        timed_out,
    }
}
