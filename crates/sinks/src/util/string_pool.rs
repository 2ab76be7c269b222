//! Pool of reusable `String` builders
//!
//! Layout rendering appends into a `String`. The builder is taken from the
//! pool, filled, copied into the output buffer and returned cleared.

use crossbeam::queue::ArrayQueue;

use super::buffer_pool::PoolMetrics;

/// Default number of pooled builders
pub const DEFAULT_STRING_POOL_SIZE: usize = 8;

/// Default initial capacity of a builder
pub const DEFAULT_STRING_CAPACITY: usize = 256;

/// Builders that grew past this are dropped on return
const MAX_RETAINED_STRING: usize = 64 * 1024;

pub struct StringPool {
    queue: ArrayQueue<String>,
    initial_capacity: usize,
    metrics: PoolMetrics,
}

impl StringPool {
    pub fn new(pool_size: usize, initial_capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(pool_size.max(1)),
            initial_capacity,
            metrics: PoolMetrics::new(),
        }
    }

    /// Take an empty builder
    #[inline]
    pub fn get(&self) -> String {
        match self.queue.pop() {
            Some(s) => {
                self.metrics.record_hit();
                s
            }
            None => {
                self.metrics.record_miss();
                String::with_capacity(self.initial_capacity)
            }
        }
    }

    /// Return a builder, clearing it
    #[inline]
    pub fn put(&self, mut s: String) {
        if s.capacity() > MAX_RETAINED_STRING {
            self.metrics.record_drop();
            return;
        }
        s.clear();
        match self.queue.push(s) {
            Ok(()) => self.metrics.record_return(),
            Err(_) => self.metrics.record_drop(),
        }
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new(DEFAULT_STRING_POOL_SIZE, DEFAULT_STRING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_are_reused() {
        let pool = StringPool::new(2, 32);
        let mut s = pool.get();
        s.push_str("hello");
        pool.put(s);

        let reused = pool.get();
        assert!(reused.is_empty());
        assert!(reused.capacity() >= 32);

        let snapshot = pool.metrics().snapshot();
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.returns, 1);
    }

    #[test]
    fn test_oversized_builder_is_dropped() {
        let pool = StringPool::new(2, 32);
        pool.put(String::with_capacity(MAX_RETAINED_STRING + 1));
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.metrics().snapshot().drops, 1);
    }
}
