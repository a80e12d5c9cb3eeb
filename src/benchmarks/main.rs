pub mod parallel;
pub mod throughput;
pub mod utils;

use std::sync::Arc;

use taskring::{BufferPool, PinningStrategy, TaskQueue, WorkerPool};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let strategy = if args.len() > 1 {
        match args[1].to_lowercase().as_str() {
            "none" => PinningStrategy::None,
            "linear" => PinningStrategy::Linear,
            "avoid-smt" | "avoid_smt" => PinningStrategy::AvoidSmt,
            _ => {
                eprintln!("Unknown strategy: {}. Using Linear.", args[1]);
                PinningStrategy::Linear
            }
        }
    } else {
        PinningStrategy::Linear
    };

    let threads = if args.len() > 2 {
        args[2]
            .parse::<usize>()
            .unwrap_or_else(|_| utils::num_cpus())
    } else {
        utils::num_cpus()
    };

    #[cfg(feature = "tracing")]
    let _collector = taskring::tracing::CollectorGuard;

    eprintln!("=======================================================");
    eprintln!("           taskring Benchmark Suite");
    eprintln!("=======================================================");
    eprintln!("\nStrategy: {:?}", strategy);
    eprintln!("Threads:  {}", threads);

    eprintln!("\n[STARTUP] Initializing queue and workers...");
    let pool = Arc::new(BufferPool::new());
    let queue = Arc::new(TaskQueue::with_capacities(4096, 512, Arc::clone(&pool)));
    let workers = WorkerPool::new_with_strategy(Arc::clone(&queue), threads, strategy);

    eprintln!("[STARTUP] Waiting 20ms for OS thread stabilization...");
    std::thread::sleep(std::time::Duration::from_millis(20));

    eprintln!("[STARTUP] Performing warmup dispatch...");
    fn warmup(_task_id: i32, _context: *mut std::ffi::c_void, _worker_index: i32) {
        std::hint::black_box(());
    }
    queue.for_blocking(warmup, std::ptr::null_mut(), 0, 100_000, threads as i32);
    eprintln!("[STARTUP] Queue is hot. Starting benchmarks.\n");

    eprintln!("=======================================================");

    let runs: Vec<fn(&Arc<TaskQueue>, PinningStrategy, usize) -> utils::BenchmarkResult> = vec![
        throughput::run_dispatch_throughput_benchmark,
        parallel::run_parallel_for_scaling_benchmark,
    ];

    for run in runs {
        let result = run(&queue, strategy, threads);
        match serde_json::to_string(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing result: {}", e),
        }
    }

    #[cfg(feature = "metrics")]
    {
        let snapshot = queue.metrics().snapshot();
        eprintln!(
            "\n[METRICS] {} tasks executed, {:.0} tasks/s, {} contested enqueues",
            snapshot.tasks_executed,
            snapshot.tasks_per_second(),
            snapshot.enqueue_contested
        );
    }

    eprintln!("\n[SHUTDOWN] Stopping workers...");
    if let Err(e) = workers.shutdown() {
        eprintln!("Warning: {}", e);
    }

    #[cfg(feature = "tracing")]
    {
        taskring::tracing::collect_thread_spans();
        if let Err(e) = taskring::tracing::export_to_file("trace.json") {
            eprintln!("Error exporting trace: {}", e);
        } else {
            eprintln!("Trace exported to trace.json");
        }
    }

    eprintln!("\n=======================================================");
    eprintln!("         All Benchmarks Completed!");
    eprintln!("=======================================================\n");
}
