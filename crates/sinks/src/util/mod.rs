//! Pooled buffers for the render path

pub mod buffer_pool;
pub mod string_pool;

pub use buffer_pool::{BufferPool, PoolMetrics, PoolSnapshot};
pub use string_pool::StringPool;
