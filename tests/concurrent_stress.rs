use std::ffi::c_void;
use std::sync::{Arc, Mutex};
use std::thread;

use taskring::{BufferPool, Task, TaskQueue};

const PRODUCERS: usize = 3;
const TASKS_PER_PRODUCER: usize = 500;
const CONSUMERS: usize = 2;

fn collect_id(task_id: i32, context: *mut c_void, _worker_index: i32) {
    let collected = unsafe { &*(context as *const Mutex<Vec<i32>>) };
    collected.lock().unwrap().push(task_id);
}

/// No record is lost or duplicated when several producers and consumers hit
/// the ring at once: the consumed multiset equals the produced multiset.
#[test]
fn test_no_loss_no_duplication_under_contention() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(128, 4, pool);
    let collected: Mutex<Vec<i32>> = Mutex::new(Vec::new());

    thread::scope(|s| {
        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|c| {
                let queue = &queue;
                s.spawn(move || while queue.dequeue_and_run(c as i32) {})
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = &queue;
                let collected = &collected;
                s.spawn(move || {
                    let context = collected as *const Mutex<Vec<i32>> as *mut c_void;
                    let ids: Vec<i32> = (0..TASKS_PER_PRODUCER)
                        .map(|i| (p * 1000 + i) as i32)
                        .collect();
                    for chunk in ids.chunks(32) {
                        let tasks: Vec<Task> = chunk
                            .iter()
                            .map(|&id| Task::new(collect_id, context, id))
                            .collect();
                        queue.enqueue(&tasks);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        queue.enqueue_stop();
        for consumer in consumers {
            consumer.join().unwrap();
        }
    });

    let mut consumed = collected.into_inner().unwrap();
    consumed.sort_unstable();
    let mut expected: Vec<i32> = (0..PRODUCERS)
        .flat_map(|p| (0..TASKS_PER_PRODUCER).map(move |i| (p * 1000 + i) as i32))
        .collect();
    expected.sort_unstable();
    assert_eq!(consumed, expected);
}

/// Interleaved producing and consuming from the same threads: every thread
/// alternates roles, and nothing is lost.
#[test]
fn test_mixed_producers_and_consumers() {
    let pool = Arc::new(BufferPool::new());
    let queue = TaskQueue::with_capacities(64, 4, pool);
    let collected: Mutex<Vec<i32>> = Mutex::new(Vec::new());

    thread::scope(|s| {
        let mixers: Vec<_> = (0..4)
            .map(|t| {
                let queue = &queue;
                let collected = &collected;
                s.spawn(move || {
                    let context = collected as *const Mutex<Vec<i32>> as *mut c_void;
                    for i in 0..100 {
                        let id = (t * 1000 + i) as i32;
                        queue.enqueue(&[Task::new(collect_id, context, id)]);
                        // Consume opportunistically to keep the ring moving.
                        if i % 2 == 0 {
                            let _ = queue.try_dequeue_and_run(t as i32);
                        }
                    }
                })
            })
            .collect();
        for mixer in mixers {
            mixer.join().unwrap();
        }
        // Drain whatever the opportunistic consumption left behind.
        while let taskring::DequeueResult::Success(_) = queue.try_dequeue_and_run(0) {}
    });

    let mut consumed = collected.into_inner().unwrap();
    consumed.sort_unstable();
    let mut expected: Vec<i32> = (0..4)
        .flat_map(|t| (0..100).map(move |i| (t * 1000 + i) as i32))
        .collect();
    expected.sort_unstable();
    assert_eq!(consumed, expected);
}
