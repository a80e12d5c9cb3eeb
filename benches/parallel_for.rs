//! Parallel-for benchmark using criterion.
//!
//! Measures `for_blocking` wall time across range sizes, with the bench
//! thread participating as the last worker index.

use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use taskring::{BufferPool, TaskQueue, WorkerPool};

fn accumulate(task_id: i32, context: *mut c_void, _worker_index: i32) {
    let sum = unsafe { &*(context as *const AtomicU64) };
    sum.fetch_add(task_id as u64, Ordering::Relaxed);
}

fn bench_for_blocking(c: &mut Criterion) {
    let num_threads = num_cpus::get();
    let pool = Arc::new(BufferPool::new());
    let queue = Arc::new(TaskQueue::with_capacities(8192, 64, Arc::clone(&pool)));
    let workers = WorkerPool::new(Arc::clone(&queue), num_threads);

    let mut group = c.benchmark_group("parallel_for");
    group.sample_size(20);

    for &range in &[256i32, 4096, 65_536] {
        group.throughput(Throughput::Elements(range as u64));
        group.bench_function(BenchmarkId::new("for_blocking", range), |b| {
            b.iter(|| {
                let sum = AtomicU64::new(0);
                queue.for_blocking(
                    accumulate,
                    &sum as *const _ as *mut c_void,
                    0,
                    range,
                    num_threads as i32,
                );
                assert_eq!(
                    sum.load(Ordering::Relaxed),
                    (range as u64 - 1) * range as u64 / 2
                );
            })
        });
    }

    group.finish();
    workers.shutdown().expect("Shutdown failed");
}

criterion_group!(benches, bench_for_blocking);
criterion_main!(benches);
