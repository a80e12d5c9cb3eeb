//! Pooled buffer allocation.
//!
//! The pool hands out typed fixed-length buffers backed by power-of-two byte
//! blocks and reclaims them for reuse. Blocks are bucketed by size; each
//! bucket keeps a free list of previously allocated blocks, so steady-state
//! take/return cycles perform no heap allocation. All pool operations go
//! through a single-word spin lock, the same discipline the queue uses.

use std::alloc::{alloc, dealloc, Layout};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

/// Alignment of every block handed out by the pool. Covers all plain-data
/// element types used by the queue.
const BLOCK_ALIGNMENT: usize = 16;

/// Smallest block the pool will allocate, in bytes.
const MIN_BLOCK_BYTES: usize = 64;

/// Number of power-of-two size buckets. Bucket `i` serves blocks of `1 << i`
/// bytes; 48 buckets cover any request the queue can make.
const BUCKET_COUNT: usize = 48;

/// A typed fixed-length view over a pooled block.
///
/// The buffer remembers which bucket its block came from so the pool can
/// reclaim it. Element storage is uninitialized on take; callers write every
/// slot they intend to read.
pub struct Buffer<T> {
    ptr: *mut T,
    len: usize,
    bucket: u32,
    _marker: PhantomData<T>,
}

// Safety: a Buffer is a plain (pointer, length) pair; it confers no thread
// affinity of its own.
unsafe impl<T: Send> Send for Buffer<T> {}
unsafe impl<T: Sync> Sync for Buffer<T> {}

impl<T> Buffer<T> {
    /// An unallocated buffer. Returning it to a pool is a no-op.
    pub fn empty() -> Self {
        Buffer {
            ptr: ptr::null_mut(),
            len: 0,
            bucket: 0,
            _marker: PhantomData,
        }
    }

    /// Returns true if this buffer currently owns a block.
    pub fn is_allocated(&self) -> bool {
        !self.ptr.is_null()
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn as_mut_ptr(&self) -> *mut T {
        self.ptr
    }

    /// Returns a pointer to the element at `index`.
    pub fn slot(&self, index: usize) -> *mut T {
        debug_assert!(index < self.len, "buffer index out of bounds");
        unsafe { self.ptr.add(index) }
    }

    /// Views the buffer as a slice.
    ///
    /// # Safety
    ///
    /// Every element in the buffer must have been written since it was taken
    /// from the pool.
    pub unsafe fn as_slice(&self) -> &[T] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// Views the buffer as a mutable slice.
    ///
    /// # Safety
    ///
    /// Every element in the buffer must have been written since it was taken
    /// from the pool.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [T] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}

struct Bucket {
    free: Vec<NonNull<u8>>,
    outstanding: usize,
}

/// A thread-safe pool of power-of-two byte blocks viewed as typed buffers.
///
/// Element types must be plain data: the pool never runs destructors on
/// buffer contents.
pub struct BufferPool {
    buckets: std::cell::UnsafeCell<Vec<Bucket>>,
    locker: CachePadded<AtomicU32>,
}

// Safety: `buckets` is only touched while `locker` is held.
unsafe impl Send for BufferPool {}
unsafe impl Sync for BufferPool {}

impl BufferPool {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        for _ in 0..BUCKET_COUNT {
            buckets.push(Bucket {
                free: Vec::new(),
                outstanding: 0,
            });
        }
        BufferPool {
            buckets: std::cell::UnsafeCell::new(buckets),
            locker: CachePadded::new(AtomicU32::new(0)),
        }
    }

    fn lock(&self) {
        let backoff = Backoff::new();
        while self
            .locker
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
    }

    fn unlock(&self) {
        self.locker.store(0, Ordering::Release);
    }

    /// Takes a buffer with room for `count` elements of `T`.
    ///
    /// The block is recycled from the matching size bucket when one is free,
    /// otherwise freshly allocated.
    ///
    /// # Panics
    ///
    /// Panics if the underlying allocation fails.
    pub fn take<T>(&self, count: usize) -> Buffer<T> {
        debug_assert!(
            !std::mem::needs_drop::<T>(),
            "pooled buffers hold plain data; element destructors never run"
        );
        debug_assert!(std::mem::align_of::<T>() <= BLOCK_ALIGNMENT);
        if count == 0 {
            return Buffer::empty();
        }
        let bytes = (count * std::mem::size_of::<T>())
            .next_power_of_two()
            .max(MIN_BLOCK_BYTES);
        let bucket_index = bytes.trailing_zeros();
        debug_assert!((bucket_index as usize) < BUCKET_COUNT);

        self.lock();
        let recycled = unsafe {
            let buckets: &mut Vec<Bucket> = &mut *self.buckets.get();
            let bucket = &mut buckets[bucket_index as usize];
            bucket.outstanding += 1;
            bucket.free.pop()
        };
        self.unlock();

        let block = recycled.unwrap_or_else(|| Self::allocate_block(bytes));
        Buffer {
            ptr: block.as_ptr() as *mut T,
            len: count,
            bucket: bucket_index,
            _marker: PhantomData,
        }
    }

    /// Returns a buffer's block to its bucket. The buffer is left empty;
    /// returning an empty buffer is a no-op.
    pub fn return_buffer<T>(&self, buffer: &mut Buffer<T>) {
        if !buffer.is_allocated() {
            return;
        }
        let block = NonNull::new(buffer.ptr as *mut u8).unwrap();
        self.lock();
        unsafe {
            let buckets: &mut Vec<Bucket> = &mut *self.buckets.get();
            let bucket = &mut buckets[buffer.bucket as usize];
            debug_assert!(bucket.outstanding > 0, "buffer returned to the wrong pool");
            bucket.outstanding -= 1;
            bucket.free.push(block);
        }
        self.unlock();
        *buffer = Buffer::empty();
    }

    /// Total bytes resident in the pool's free lists.
    pub fn free_block_bytes(&self) -> usize {
        self.lock();
        let bytes = unsafe {
            (*self.buckets.get())
                .iter()
                .enumerate()
                .map(|(i, bucket)| bucket.free.len() << i)
                .sum()
        };
        self.unlock();
        bytes
    }

    fn allocate_block(bytes: usize) -> NonNull<u8> {
        let layout =
            Layout::from_size_align(bytes, BLOCK_ALIGNMENT).expect("invalid pool block layout");
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).expect("failed to allocate backing memory for a pool block")
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        let buckets = self.buckets.get_mut();
        for (index, bucket) in buckets.iter_mut().enumerate() {
            debug_assert!(
                bucket.outstanding == 0 || std::thread::panicking(),
                "buffers were still outstanding when the pool was dropped"
            );
            let layout = Layout::from_size_align(1 << index, BLOCK_ALIGNMENT).unwrap();
            for block in bucket.free.drain(..) {
                unsafe { dealloc(block.as_ptr(), layout) };
            }
        }
    }
}
