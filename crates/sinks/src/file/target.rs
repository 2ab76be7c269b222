//! File target
//!
//! Renders events through a layout and appends them to the file named by a
//! path layout. Consecutive events of a batch that resolve to the same path
//! are written with one call. Before each write the appender's archive state
//! is checked; a due file is renamed to `<stem>.<n>.<ext>` and a fresh file
//! is started.
//!
//! With an open-file cache timeout, a sweep on the pipeline timer closes
//! appenders that have been open longer than the timeout.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use scribe_pipeline::{RateLimitedLogger, Target, Timer, TimerHandle};
use scribe_protocol::{Continuation, DeliveryResult, Event};
use tracing::{debug, info};

use super::appender::AppenderOptions;
use super::cache::{DEFAULT_CACHE_CAPACITY, FileAppenderCache};
use super::error::{FileError, Result};
use crate::layout::Layout;
use crate::util::{BufferPool, StringPool};

/// Buffers kept per file target
const TARGET_POOL_SIZE: usize = 4;

/// Initial size of a render buffer
const TARGET_BUFFER_CAPACITY: usize = 16 * 1024;

/// Settings for a `FileTarget`
#[derive(Debug, Clone)]
pub struct FileTargetConfig {
    /// File name, rendered per event
    pub path: Layout,
    /// Line format
    pub layout: Layout,
    pub appender: AppenderOptions,
    pub cache_capacity: usize,
    /// Archives kept per file; `None` keeps all
    pub max_archive_files: Option<usize>,
    pub line_ending: &'static str,
    /// Close appenders open longer than this; `None` keeps them open
    pub open_file_cache_timeout: Option<Duration>,
    /// Archive a non-empty file the first time this target opens it
    pub archive_old_file_on_startup: bool,
}

impl FileTargetConfig {
    pub fn new(path: Layout) -> Self {
        Self {
            path,
            layout: Layout::default(),
            appender: AppenderOptions::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_archive_files: None,
            line_ending: "\n",
            open_file_cache_timeout: None,
            archive_old_file_on_startup: false,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_appender(mut self, appender: AppenderOptions) -> Self {
        self.appender = appender;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_max_archive_files(mut self, max: usize) -> Self {
        self.max_archive_files = Some(max);
        self
    }

    pub fn with_line_ending(mut self, line_ending: &'static str) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn with_open_file_cache_timeout(mut self, timeout: Duration) -> Self {
        self.open_file_cache_timeout = Some(timeout);
        self
    }

    pub fn with_archive_old_file_on_startup(mut self, enabled: bool) -> Self {
        self.archive_old_file_on_startup = enabled;
        self
    }
}

/// Periodic close of long-open appenders
struct CacheSweep {
    cache: Weak<FileAppenderCache>,
    timer: Timer,
    timeout: Duration,
    pending: Mutex<Option<TimerHandle>>,
    stopped: AtomicBool,
}

impl CacheSweep {
    fn arm(self: &Arc<Self>) {
        let sweep = Arc::clone(self);
        let handle = self.timer.schedule(self.timeout, move || sweep.run());
        let mut pending = self.pending.lock();
        if self.stopped.load(Ordering::Acquire) {
            handle.cancel();
        }
        *pending = Some(handle);
    }

    fn run(self: Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        if let Some(cutoff) = SystemTime::now().checked_sub(self.timeout) {
            let closed = cache.close_appenders(Some(cutoff));
            if closed > 0 {
                debug!(closed, "closed appenders past the open file cache timeout");
            }
        }
        self.arm();
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.pending.lock().take() {
            handle.cancel();
        }
    }
}

pub struct FileTarget {
    name: String,
    config: FileTargetConfig,
    cache: Arc<FileAppenderCache>,
    sweep: Mutex<Option<Arc<CacheSweep>>>,
    /// Paths already checked for archive-on-startup
    started: Mutex<HashSet<PathBuf>>,
    buffers: BufferPool,
    strings: StringPool,
    archive_failures: RateLimitedLogger,
    archives_rolled: AtomicU64,
}

impl FileTarget {
    pub fn new(name: impl Into<String>, config: FileTargetConfig) -> Self {
        let cache = Arc::new(FileAppenderCache::new(config.cache_capacity, config.appender));
        Self {
            name: name.into(),
            cache,
            sweep: Mutex::new(None),
            started: Mutex::new(HashSet::new()),
            config,
            buffers: BufferPool::new(TARGET_POOL_SIZE, TARGET_BUFFER_CAPACITY),
            strings: StringPool::default(),
            archive_failures: RateLimitedLogger::default(),
            archives_rolled: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &FileTargetConfig {
        &self.config
    }

    pub fn cache(&self) -> &FileAppenderCache {
        &self.cache
    }

    /// Files renamed to an archive so far
    pub fn archives_rolled(&self) -> u64 {
        self.archives_rolled.load(Ordering::Relaxed)
    }

    /// Resolve the file an event goes to
    pub fn path_for(&self, event: &Event) -> PathBuf {
        let mut rendered = self.strings.get();
        self.config.path.render(event, &mut rendered);
        let path = PathBuf::from(rendered.as_str());
        self.strings.put(rendered);
        path
    }

    fn write_events<'a>(&self, events: impl Iterator<Item = &'a Event>) -> Result<()> {
        let mut buf = self.buffers.get();
        let mut line = self.strings.get();
        let mut group: Option<(PathBuf, DateTime<Local>)> = None;
        let mut result = Ok(());

        for event in events {
            let path = self.path_for(event);
            if let Some((current, first)) = &group
                && *current != path
            {
                result = self.write_group(current, *first, &buf);
                buf.clear();
                if result.is_err() {
                    break;
                }
            }
            if group.as_ref().is_none_or(|(current, _)| *current != path) {
                group = Some((path, event.timestamp()));
            }

            line.clear();
            self.config.layout.render(event, &mut line);
            line.push_str(self.config.line_ending);
            buf.extend_from_slice(line.as_bytes());
        }

        if result.is_ok()
            && let Some((path, first)) = &group
            && !buf.is_empty()
        {
            result = self.write_group(path, *first, &buf);
        }

        self.strings.put(line);
        self.buffers.put(buf);
        result
    }

    fn write_group(&self, path: &Path, first: DateTime<Local>, bytes: &[u8]) -> Result<()> {
        if self.config.archive_old_file_on_startup {
            self.archive_on_first_open(path);
        }
        let mut appender = self.cache.allocate(path)?;
        if appender.is_archive_due(first) {
            self.roll(path);
            appender = self.cache.allocate(path)?;
        }
        match self.cache.write(&appender, bytes) {
            // Evicted by a concurrent allocation; reopen once
            Err(FileError::Closed { .. }) => {
                let appender = self.cache.allocate(path)?;
                self.cache.write(&appender, bytes)
            }
            other => other,
        }
    }

    fn archive_on_first_open(&self, path: &Path) {
        if !self.started.lock().insert(path.to_path_buf()) {
            return;
        }
        let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if existing > 0 && !self.cache.contains(path) {
            debug!(target_name = %self.name, path = %path.display(), "archiving file left from a previous run");
            self.roll(path);
        }
    }

    /// Move the current file aside and prune old archives
    ///
    /// Failures are logged and writing continues on the current file.
    fn roll(&self, path: &Path) {
        self.cache.invalidate(path);
        match archive_file(path, self.config.max_archive_files) {
            Ok(archived) => {
                self.archives_rolled.fetch_add(1, Ordering::Relaxed);
                info!(target_name = %self.name, path = %path.display(), archive = %archived.display(), "archived log file");
            }
            Err(e) => {
                self.archive_failures
                    .warn(&self.name, "failed to archive log file", &e);
            }
        }
    }
}

impl Target for FileTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, timer: &Timer) {
        let Some(timeout) = self.config.open_file_cache_timeout else {
            return;
        };
        if timeout.is_zero() {
            return;
        }
        let sweep = Arc::new(CacheSweep {
            cache: Arc::downgrade(&self.cache),
            timer: timer.clone(),
            timeout,
            pending: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        sweep.arm();
        if let Some(previous) = self.sweep.lock().replace(sweep) {
            previous.stop();
        }
    }

    fn write(&self, event: &Event) -> DeliveryResult {
        self.write_events(std::iter::once(event))
            .map_err(Into::into)
    }

    fn write_batch(&self, events: &[Arc<Event>]) -> DeliveryResult {
        self.write_events(events.iter().map(|e| e.as_ref()))
            .map_err(Into::into)
    }

    fn flush(&self, continuation: Continuation) {
        continuation.complete(self.cache.flush_all().map_err(Into::into));
    }

    fn close(&self) {
        if let Some(sweep) = self.sweep.lock().take() {
            sweep.stop();
        }
        let closed = self.cache.close_appenders(None);
        debug!(target_name = %self.name, closed, "file target closed");
    }
}

impl std::fmt::Debug for FileTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTarget")
            .field("name", &self.name)
            .field("path", &self.config.path.template())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Archive naming
// =============================================================================

/// Rename `path` to the next free `<stem>.<n>.<ext>` and prune to `max` archives
fn archive_file(path: &Path, max: Option<usize>) -> Result<PathBuf> {
    let mut existing = list_archives(path)?;
    let next = existing.last().map_or(1, |(n, _)| n + 1);
    let archived = archive_name(path, next);
    fs::rename(path, &archived).map_err(|e| FileError::archive(path, e))?;
    existing.push((next, archived.clone()));

    if let Some(max) = max
        && existing.len() > max
    {
        let excess = existing.len() - max;
        for (_, old) in existing.drain(..excess) {
            if let Err(e) = fs::remove_file(&old) {
                debug!(path = %old.display(), error = %e, "failed to delete old archive");
            }
        }
    }
    Ok(archived)
}

fn split_name(path: &Path) -> (String, Option<String>) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    (stem, ext)
}

pub(crate) fn archive_name(path: &Path, index: u32) -> PathBuf {
    let (stem, ext) = split_name(path);
    let name = match ext {
        Some(ext) => format!("{stem}.{index}.{ext}"),
        None => format!("{stem}.{index}"),
    };
    path.with_file_name(name)
}

/// Existing archives of `path`, oldest (lowest index) first
fn list_archives(path: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let (stem, ext) = split_name(path);
    let prefix = format!("{stem}.");
    let suffix = ext.map(|e| format!(".{e}")).unwrap_or_default();

    let entries = fs::read_dir(dir).map_err(|e| FileError::archive(path, e))?;
    let mut archives: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            let index = name
                .strip_prefix(&prefix)?
                .strip_suffix(suffix.as_str())?
                .parse::<u32>()
                .ok()?;
            Some((index, entry.path()))
        })
        .collect();
    archives.sort_by_key(|(index, _)| *index);
    Ok(archives)
}

#[cfg(test)]
#[path = "target_test.rs"]
mod target_test;
