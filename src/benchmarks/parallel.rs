use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use taskring::{PinningStrategy, TaskQueue};

use crate::utils::{BenchmarkResult, DataPoint, SystemInfo};

fn accumulate(task_id: i32, context: *mut c_void, _worker_index: i32) {
    let sum = unsafe { &*(context as *const AtomicU64) };
    sum.fetch_add(task_id as u64, Ordering::Relaxed);
}

/// Measures `for_blocking` over growing ranges, with the harness thread
/// participating as the last worker index.
pub fn run_parallel_for_scaling_benchmark(
    queue: &Arc<TaskQueue>,
    strategy: PinningStrategy,
    threads: usize,
) -> BenchmarkResult {
    eprintln!("\n=== Benchmark: Parallel-For Scaling ===");

    let system_info = SystemInfo::collect(strategy, threads);

    let test_sizes = vec![16, 256, 4_096, 65_536, 1_048_576];

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

        eprintln!("\nParallel-for over [0, {})...", num_tasks);

        #[cfg(feature = "tracing")]
        let _span = taskring::tracing::SpanGuard::new("parallel_for", threads);

        let sum = AtomicU64::new(0);
        let start = Instant::now();
        queue.for_blocking(
            accumulate,
            &sum as *const _ as *mut c_void,
            0,
            num_tasks as i32,
            threads as i32,
        );
        let elapsed = start.elapsed();

        let expected: u64 = (0..num_tasks as u64).sum();
        assert_eq!(sum.load(Ordering::Relaxed), expected);

        let time_ms = elapsed.as_secs_f64() * 1000.0;
        eprintln!(
            "  {} iterations in {:.3} ms ({:.0} iterations/s)",
            num_tasks,
            time_ms,
            num_tasks as f64 / elapsed.as_secs_f64()
        );
        data_points.push(DataPoint { num_tasks, time_ms });
    }

    BenchmarkResult {
        name: "parallel_for_scaling".to_string(),
        data_points,
        system_info,
        timed_out,
    }
}
