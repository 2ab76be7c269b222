//! Bounded cache of open file appenders
//!
//! Entries are kept most-recently-used first. Allocating a path that is not
//! cached opens it and, when the cache is full, evicts the entry at the back.
//! The cache lock covers lookup, open and eviction only; writes go straight
//! to the appender and never wait on the cache.
//!
//! ```text
//! allocate("b")   [a, b, c]  ->  [b, a, c]
//! allocate("d")   [b, a, c]  ->  [d, b, a]   (c closed)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use scribe_pipeline::RateLimitedLogger;
use tracing::{debug, warn};

use super::appender::{AppenderOptions, FileAppender, birth_time_of, stat_path};
use super::error::{FileError, Result};

/// Default number of files kept open at once
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

pub struct FileAppenderCache {
    capacity: usize,
    options: AppenderOptions,
    entries: Mutex<Vec<Arc<FileAppender>>>,
    diagnostics: Arc<RateLimitedLogger>,
}

impl FileAppenderCache {
    /// Cache holding at most `capacity` open appenders
    ///
    /// A capacity of 0 yields a cache whose operations all fail with
    /// `FileError::EmptyCache`.
    pub fn new(capacity: usize, options: AppenderOptions) -> Self {
        Self {
            capacity,
            options,
            entries: Mutex::new(Vec::with_capacity(capacity)),
            diagnostics: Arc::new(RateLimitedLogger::default()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn options(&self) -> &AppenderOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.entries.lock().iter().any(|e| e.path() == path)
    }

    /// Cached paths, most recently used first
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .iter()
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    /// Appender for `path`, opening it if needed
    ///
    /// The new file is opened before anything is evicted, so a failed open
    /// leaves the cache unchanged.
    pub fn allocate(&self, path: impl AsRef<Path>) -> Result<Arc<FileAppender>> {
        self.ensure_capacity()?;
        let path = path.as_ref();

        let (appender, evicted) = {
            let mut entries = self.entries.lock();
            if let Some(index) = entries.iter().position(|e| e.path() == path) {
                entries[..=index].rotate_right(1);
                return Ok(Arc::clone(&entries[0]));
            }

            let appender = Arc::new(FileAppender::open(
                path.to_path_buf(),
                self.options,
                Arc::clone(&self.diagnostics),
            )?);
            let evicted = if entries.len() >= self.capacity {
                entries.pop()
            } else {
                None
            };
            entries.insert(0, Arc::clone(&appender));
            (appender, evicted)
        };

        if let Some(old) = evicted {
            debug!(evicted = %old.path().display(), path = %path.display(), "appender cache full");
            old.close();
        }
        Ok(appender)
    }

    /// Write through an allocated appender
    ///
    /// Fails with `FileError::Closed` if the appender was evicted or
    /// invalidated since it was allocated.
    pub fn write(&self, appender: &FileAppender, bytes: &[u8]) -> Result<()> {
        appender.write(bytes)
    }

    pub fn flush(&self, appender: &FileAppender) -> Result<()> {
        appender.flush()
    }

    /// Close and forget the appender for `path`; false if none was cached
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let removed = {
            let mut entries = self.entries.lock();
            entries
                .iter()
                .position(|e| e.path() == path)
                .map(|index| entries.remove(index))
        };
        match removed {
            Some(appender) => {
                appender.close();
                true
            }
            None => false,
        }
    }

    /// Close appenders opened before `older_than`, or all of them for `None`
    ///
    /// Returns how many were closed.
    pub fn close_appenders(&self, older_than: Option<SystemTime>) -> usize {
        let closed: Vec<Arc<FileAppender>> = {
            let mut entries = self.entries.lock();
            match older_than {
                None => entries.drain(..).collect(),
                Some(cutoff) => {
                    let (expired, kept): (Vec<_>, Vec<_>) =
                        entries.drain(..).partition(|e| e.opened_at() < cutoff);
                    *entries = kept;
                    expired
                }
            }
        };
        for appender in &closed {
            appender.close();
        }
        closed.len()
    }

    /// Flush every open appender; the first failure is returned after all
    /// appenders were attempted
    pub fn flush_all(&self) -> Result<()> {
        let entries: Vec<Arc<FileAppender>> = self.entries.lock().clone();
        let mut first_error = None;
        for appender in entries {
            if let Err(e) = appender.flush() {
                warn!(path = %appender.path().display(), error = %e, "flush failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Size of `path` in bytes
    ///
    /// Uncached paths are answered from the filesystem when `fallback` is
    /// set; otherwise, or when the stat fails, the answer is `None`.
    pub fn file_length(&self, path: impl AsRef<Path>, fallback: bool) -> Result<Option<u64>> {
        self.query(path.as_ref(), fallback, FileAppender::length, |m| {
            Some(m.len())
        })
    }

    pub fn last_write_time(
        &self,
        path: impl AsRef<Path>,
        fallback: bool,
    ) -> Result<Option<SystemTime>> {
        self.query(path.as_ref(), fallback, FileAppender::last_write_time, |m| {
            m.modified().ok()
        })
    }

    /// Creation time, validated against the last write time
    pub fn birth_time(&self, path: impl AsRef<Path>, fallback: bool) -> Result<Option<SystemTime>> {
        self.query(
            path.as_ref(),
            fallback,
            FileAppender::birth_time,
            birth_time_of,
        )
    }

    fn query<T>(
        &self,
        path: &Path,
        fallback: bool,
        cached: impl FnOnce(&FileAppender) -> Option<T>,
        from_disk: impl FnOnce(&std::fs::Metadata) -> Option<T>,
    ) -> Result<Option<T>> {
        self.ensure_capacity()?;
        if let Some(appender) = self.lookup(path) {
            return Ok(cached(&*appender));
        }
        if !fallback {
            return Ok(None);
        }
        Ok(stat_path(path, &self.diagnostics).as_ref().and_then(from_disk))
    }

    fn lookup(&self, path: &Path) -> Option<Arc<FileAppender>> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.path() == path)
            .cloned()
    }

    #[inline]
    fn ensure_capacity(&self) -> Result<()> {
        if self.capacity == 0 {
            Err(FileError::EmptyCache)
        } else {
            Ok(())
        }
    }
}

impl Default for FileAppenderCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, AppenderOptions::default())
    }
}

impl Drop for FileAppenderCache {
    fn drop(&mut self) {
        self.close_appenders(None);
    }
}

impl std::fmt::Debug for FileAppenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAppenderCache")
            .field("capacity", &self.capacity)
            .field("paths", &self.paths())
            .finish()
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
