//! Chrome Tracing collector for worker activity visualization.
//!
//! Records spans into thread-local buffers with no cross-thread contention on
//! the hot path, then merges them on demand into a JSON file readable by
//! chrome://tracing or ui.perfetto.dev.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A single completed span in Chrome Tracing format.
#[derive(Debug, Clone)]
pub struct TraceSpan {
    pub name: &'static str,
    pub worker: usize,
    pub start_us: u64,
    pub duration_us: u64,
}

thread_local! {
    static SPAN_BUFFER: RefCell<Vec<TraceSpan>> = RefCell::new(Vec::with_capacity(8192));
}

lazy_static::lazy_static! {
    static ref TRACE_START: Instant = Instant::now();
    static ref EPOCH_START_US: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as u64;
    static ref COLLECTED: Mutex<Vec<Vec<TraceSpan>>> = Mutex::new(Vec::new());
}

/// Records one completed span into the current thread's buffer.
pub fn record_span(name: &'static str, worker: usize, start: Instant, duration: Duration) {
    let start_us = start.duration_since(*TRACE_START).as_micros() as u64 + *EPOCH_START_US;
    SPAN_BUFFER.with(|buffer| {
        buffer.borrow_mut().push(TraceSpan {
            name,
            worker,
            start_us,
            duration_us: duration.as_micros() as u64,
        });
    });
}

/// Moves the current thread's spans into the global collection. Each thread
/// that recorded spans must call this before export.
pub fn collect_thread_spans() {
    SPAN_BUFFER.with(|buffer| {
        let mut local = buffer.borrow_mut();
        if !local.is_empty() {
            COLLECTED.lock().unwrap().push(std::mem::take(&mut *local));
        }
    });
}

/// Writes all collected spans to `path` as a Chrome Tracing event array.
pub fn export_to_file(path: &str) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let collected = COLLECTED.lock().unwrap();

    write!(writer, "[\n")?;
    let mut first = true;
    for spans in collected.iter() {
        for span in spans {
            if !first {
                write!(writer, ",\n")?;
            }
            first = false;
            // ph: X is a complete event; tid carries the worker index.
            write!(
                writer,
                "{{\"name\":\"{}\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
                span.name, span.start_us, span.duration_us, span.worker
            )?;
        }
    }
    write!(writer, "\n]\n")?;
    writer.flush()
}

/// RAII helper recording the span from construction to drop.
pub struct SpanGuard {
    name: &'static str,
    worker: usize,
    start: Instant,
}

impl SpanGuard {
    pub fn new(name: &'static str, worker: usize) -> Self {
        SpanGuard {
            name,
            worker,
            start: Instant::now(),
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        record_span(self.name, self.worker, self.start, self.start.elapsed());
    }
}

/// RAII guard that collects the calling thread's spans when dropped.
pub struct CollectorGuard;

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        collect_thread_spans();
    }
}
