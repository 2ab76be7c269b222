//! One open log file
//!
//! A `FileAppender` owns the handle (or, in minimal mode, just the path) for
//! one file plus its metadata and archive bookkeeping. Writes to different
//! appenders never contend: each appender serializes only its own writes.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Local};
use fs2::FileExt;
use parking_lot::Mutex;
use scribe_pipeline::RateLimitedLogger;
use tracing::debug;

use super::archive::{ArchivePolicy, ArchiveState};
use super::error::{FileError, Result};
use super::locking::{DEFAULT_LOCK_ATTEMPTS, DEFAULT_LOCK_BACKOFF, LockingMode};

/// How often an exclusive appender checks that its file still exists
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Settings shared by every appender of one cache
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppenderOptions {
    pub mode: LockingMode,
    pub archive: ArchivePolicy,
    pub recheck_interval: Duration,
    pub lock_attempts: u32,
    pub lock_backoff: Duration,
    /// Create missing parent directories on open
    pub create_dirs: bool,
}

impl Default for AppenderOptions {
    fn default() -> Self {
        Self {
            mode: LockingMode::default(),
            archive: ArchivePolicy::default(),
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_backoff: DEFAULT_LOCK_BACKOFF,
            create_dirs: true,
        }
    }
}

impl AppenderOptions {
    pub fn with_mode(mut self, mode: LockingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_archive(mut self, archive: ArchivePolicy) -> Self {
        self.archive = archive;
        self
    }

    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    pub fn with_lock_attempts(mut self, attempts: u32, backoff: Duration) -> Self {
        self.lock_attempts = attempts.max(1);
        self.lock_backoff = backoff;
        self
    }

    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }
}

/// Open file plus cached metadata
pub struct FileAppender {
    path: PathBuf,
    options: AppenderOptions,
    opened_at: SystemTime,
    state: Mutex<AppenderState>,
    diagnostics: Arc<RateLimitedLogger>,
}

struct AppenderState {
    /// `None` in minimal mode, or after close
    file: Option<File>,
    closed: bool,
    length: u64,
    last_write: SystemTime,
    last_check: Instant,
    archive: ArchiveState,
}

impl FileAppender {
    /// Open (creating if needed) the file at `path`
    pub(crate) fn open(
        path: PathBuf,
        options: AppenderOptions,
        diagnostics: Arc<RateLimitedLogger>,
    ) -> Result<Self> {
        if options.create_dirs
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| FileError::open(&path, e))?;
        }

        let file = open_append(&path)?;
        let opened_at = SystemTime::now();
        let metadata = file.metadata().ok();
        let length = metadata.as_ref().map_or(0, Metadata::len);
        let last_write = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .unwrap_or(opened_at);
        let birth = metadata
            .as_ref()
            .and_then(birth_time_of)
            .unwrap_or(opened_at);

        debug!(path = %path.display(), mode = %options.mode, length, "opened appender");

        let state = AppenderState {
            file: options.mode.keeps_handle().then_some(file),
            closed: false,
            length,
            last_write,
            last_check: Instant::now(),
            archive: ArchiveState::new(options.archive, DateTime::<Local>::from(birth)),
        };

        Ok(Self {
            path,
            options,
            opened_at,
            state: Mutex::new(state),
            diagnostics,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn mode(&self) -> LockingMode {
        self.options.mode
    }

    /// When this appender opened its file
    #[inline]
    pub fn opened_at(&self) -> SystemTime {
        self.opened_at
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Append `bytes`; on return `length()` includes them
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FileError::closed(&self.path));
        }
        match self.options.mode {
            LockingMode::Exclusive => {
                self.recheck_exists(&mut state);
                let file = self.handle(&mut state)?;
                file.write_all(bytes)
                    .map_err(|e| FileError::write(&self.path, e))?;
                state.length += bytes.len() as u64;
            }
            LockingMode::CrossProcess => {
                self.recheck_exists(&mut state);
                let attempts = self.options.lock_attempts;
                let backoff = self.options.lock_backoff;
                let file = self.handle(&mut state)?;
                lock_with_retry(file, &self.path, attempts, backoff)?;
                let written = file
                    .write_all(bytes)
                    .and_then(|()| file.metadata())
                    .map_err(|e| FileError::write(&self.path, e));
                if let Err(e) = FileExt::unlock(&*file) {
                    self.diagnostics
                        .warn("file.unlock", &self.path.display().to_string(), &e);
                }
                state.length = written?.len();
            }
            LockingMode::Minimal => {
                let mut file = open_append(&self.path)?;
                file.write_all(bytes)
                    .and_then(|()| file.flush())
                    .map_err(|e| FileError::write(&self.path, e))?;
                let counted = state.length + bytes.len() as u64;
                state.length = file.metadata().map_or(counted, |m| m.len());
            }
        }
        state.last_write = SystemTime::now();
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.file.as_mut() {
            Some(file) => file.flush().map_err(|e| FileError::flush(&self.path, e)),
            None => Ok(()),
        }
    }

    /// Current size in bytes
    ///
    /// Minimal appenders ask the filesystem; `None` when that fails.
    pub fn length(&self) -> Option<u64> {
        match self.options.mode {
            LockingMode::Minimal => self.stat().map(|m| m.len()),
            _ => Some(self.state.lock().length),
        }
    }

    pub fn last_write_time(&self) -> Option<SystemTime> {
        match self.options.mode {
            LockingMode::Minimal => self.stat().and_then(|m| m.modified().ok()),
            _ => Some(self.state.lock().last_write),
        }
    }

    pub fn birth_time(&self) -> Option<SystemTime> {
        match self.options.mode {
            LockingMode::Minimal => self.stat().as_ref().and_then(birth_time_of),
            _ => Some(self.state.lock().archive.birth_time().into()),
        }
    }

    /// Next archive boundary for this file, if a period is configured
    pub fn next_archive_time(&self) -> Option<DateTime<Local>> {
        let mut state = self.state.lock();
        self.refresh_birth(&mut state);
        state.archive.next_archive_time()
    }

    /// Whether a write at `now` should roll the file first
    pub fn is_archive_due(&self, now: DateTime<Local>) -> bool {
        if !self.options.archive.is_enabled() {
            return false;
        }
        let length = self.length().unwrap_or(0);
        let mut state = self.state.lock();
        self.refresh_birth(&mut state);
        state.archive.is_due(now, length)
    }

    /// Times the archive boundary has been computed
    pub fn archive_recompute_count(&self) -> u64 {
        self.state.lock().archive.recompute_count()
    }

    /// Release the handle; later writes fail with `FileError::Closed`
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(mut file) = state.file.take()
            && let Err(e) = file.flush()
        {
            self.diagnostics
                .warn("file.close", &self.path.display().to_string(), &e);
        }
    }

    fn handle<'a>(&self, state: &'a mut AppenderState) -> Result<&'a mut File> {
        if state.file.is_none() {
            state.file = Some(open_append(&self.path)?);
        }
        state
            .file
            .as_mut()
            .ok_or_else(|| FileError::closed(&self.path))
    }

    /// Reopen the file if it was deleted behind our back
    fn recheck_exists(&self, state: &mut AppenderState) {
        if state.last_check.elapsed() < self.options.recheck_interval {
            return;
        }
        state.last_check = Instant::now();
        match self.path.try_exists() {
            Ok(true) => {}
            Ok(false) => {
                debug!(path = %self.path.display(), "file deleted externally, reopening");
                state.file = None;
                match open_append(&self.path) {
                    Ok(file) => {
                        let now = SystemTime::now();
                        state.length = file.metadata().map_or(0, |m| m.len());
                        state.last_write = now;
                        state.archive.set_birth_time(now.into());
                        state.file = Some(file);
                    }
                    Err(e) => {
                        // The write that follows retries the open and reports the error
                        self.diagnostics
                            .warn("file.reopen", &self.path.display().to_string(), &e);
                    }
                }
            }
            Err(e) => {
                self.diagnostics
                    .warn("file.exists", &self.path.display().to_string(), &e);
            }
        }
    }

    /// Minimal appenders track the file's birth on disk, which changes when
    /// another writer rolls it
    fn refresh_birth(&self, state: &mut AppenderState) {
        if self.options.mode != LockingMode::Minimal {
            return;
        }
        if let Some(birth) = self.stat().as_ref().and_then(birth_time_of) {
            state.archive.set_birth_time(birth.into());
        }
    }

    fn stat(&self) -> Option<Metadata> {
        stat_path(&self.path, &self.diagnostics)
    }
}

impl std::fmt::Debug for FileAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAppender")
            .field("path", &self.path)
            .field("mode", &self.options.mode)
            .field("opened_at", &self.opened_at)
            .finish_non_exhaustive()
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| FileError::open(path, e))
}

fn lock_with_retry(file: &File, path: &Path, attempts: u32, backoff: Duration) -> Result<()> {
    for attempt in 1..=attempts {
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                if attempt < attempts {
                    thread::sleep(backoff);
                }
            }
            Err(e) => return Err(FileError::write(path, e)),
        }
    }
    Err(FileError::LockContention {
        path: path.to_path_buf(),
        attempts,
    })
}

/// Stat `path`, degrading to `None` with a rate-limited warning
pub(crate) fn stat_path(path: &Path, diagnostics: &RateLimitedLogger) -> Option<Metadata> {
    match fs::metadata(path) {
        Ok(metadata) => Some(metadata),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            diagnostics.warn("file.stat", &path.display().to_string(), &e);
            None
        }
    }
}

/// Creation time, or last write time when creation is unknown or later than
/// the last write (copied or restored files)
pub(crate) fn birth_time_of(metadata: &Metadata) -> Option<SystemTime> {
    let modified = metadata.modified().ok();
    match (metadata.created().ok(), modified) {
        (Some(created), Some(modified)) if created <= modified => Some(created),
        (created, None) => created,
        (_, modified) => modified,
    }
}

#[cfg(test)]
#[path = "appender_test.rs"]
mod appender_test;
