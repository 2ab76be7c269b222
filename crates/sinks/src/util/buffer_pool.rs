//! Lock-free pool of byte buffers for rendered output
//!
//! Targets render each batch into a `BytesMut` before handing it to the
//! file layer. Pooling those buffers keeps the write path free of
//! allocations once the pool is warm.
//!
//! ```ignore
//! let pool = BufferPool::new(16, 64 * 1024);
//!
//! let mut buf = pool.get();
//! buf.extend_from_slice(line.as_bytes());
//! appender.write(&buf)?;
//! pool.put(buf);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

/// Buffers kept by a target's pool
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Initial capacity of a pooled buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Buffers that grew beyond this are dropped instead of pooled
pub const MAX_RETAINED_CAPACITY: usize = 4 * 1024 * 1024;

/// Pool of reusable `BytesMut` buffers
///
/// Pre-allocates at construction. When empty, `get` allocates a fresh
/// buffer which can later be returned with `put`.
pub struct BufferPool {
    queue: ArrayQueue<BytesMut>,
    buffer_capacity: usize,
    metrics: PoolMetrics,
}

/// Hit/miss counters shared by the byte and string pools
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub returns: AtomicU64,
    pub drops: AtomicU64,
}

impl PoolMetrics {
    pub const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub drops: u64,
}

impl PoolSnapshot {
    /// Hit rate (0.0 - 1.0); 1.0 before the first `get`
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl BufferPool {
    /// Pool of `pool_size` buffers with `buffer_capacity` bytes each
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        let queue = ArrayQueue::new(pool_size.max(1));
        for _ in 0..pool_size {
            let _ = queue.push(BytesMut::with_capacity(buffer_capacity));
        }
        Self {
            queue,
            buffer_capacity,
            metrics: PoolMetrics::new(),
        }
    }

    /// Take a buffer, allocating if the pool is empty
    #[inline]
    pub fn get(&self) -> BytesMut {
        match self.queue.pop() {
            Some(buf) => {
                self.metrics.record_hit();
                buf
            }
            None => {
                self.metrics.record_miss();
                BytesMut::with_capacity(self.buffer_capacity)
            }
        }
    }

    /// Clear and return a buffer
    ///
    /// Buffers that shrank below the pool's capacity (after a split) or grew
    /// past `MAX_RETAINED_CAPACITY` are dropped.
    #[inline]
    pub fn put(&self, mut buf: BytesMut) {
        buf.clear();
        let capacity = buf.capacity();
        if capacity < self.buffer_capacity || capacity > MAX_RETAINED_CAPACITY {
            self.metrics.record_drop();
            return;
        }
        match self.queue.push(buf) {
            Ok(()) => self.metrics.record_return(),
            Err(_) => self.metrics.record_drop(),
        }
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    #[inline]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
#[path = "buffer_pool_test.rs"]
mod buffer_pool_test;
