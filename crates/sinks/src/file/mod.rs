//! File output
//!
//! ```text
//! FileTarget ──→ Layout (path) ──→ FileAppenderCache ──→ FileAppender ──→ disk
//!                                      (LRU, capacity)      (LockingMode,
//!                                                             ArchiveState)
//! ```

mod appender;
mod archive;
mod cache;
mod error;
mod locking;
mod target;

pub use appender::{AppenderOptions, DEFAULT_RECHECK_INTERVAL, FileAppender};
pub use archive::{ArchivePeriod, ArchivePolicy, ArchiveState};
pub use cache::{DEFAULT_CACHE_CAPACITY, FileAppenderCache};
pub use error::{FileError, Result};
pub use locking::{DEFAULT_LOCK_ATTEMPTS, DEFAULT_LOCK_BACKOFF, LockingMode};
pub use target::{FileTarget, FileTargetConfig};
