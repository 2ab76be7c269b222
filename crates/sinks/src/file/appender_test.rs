//! File appender tests

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use scribe_pipeline::RateLimitedLogger;
use tempfile::TempDir;

use super::*;
use crate::file::archive::ArchivePeriod;

fn open(path: PathBuf, options: AppenderOptions) -> FileAppender {
    FileAppender::open(path, options, Arc::new(RateLimitedLogger::default())).unwrap()
}

fn append_externally(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

// ============================================================================
// Exclusive
// ============================================================================

#[test]
fn test_exclusive_counts_length_in_memory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let appender = open(path.clone(), AppenderOptions::default());

    appender.write(b"first\n").unwrap();
    appender.write(b"second\n").unwrap();

    assert_eq!(appender.length(), Some(13));
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    assert_eq!(appender.mode(), LockingMode::Exclusive);
}

#[test]
fn test_exclusive_appends_to_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, b"old\n").unwrap();

    let appender = open(path.clone(), AppenderOptions::default());
    assert_eq!(appender.length(), Some(4));
    appender.write(b"new\n").unwrap();
    assert_eq!(appender.length(), Some(8));
    assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
}

#[test]
fn test_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/deeper/app.log");
    let appender = open(path.clone(), AppenderOptions::default());
    appender.write(b"x").unwrap();
    assert!(path.exists());
}

#[test]
fn test_missing_directory_without_create_dirs_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing/app.log");
    let result = FileAppender::open(
        path,
        AppenderOptions::default().with_create_dirs(false),
        Arc::new(RateLimitedLogger::default()),
    );
    assert!(matches!(result, Err(FileError::Open { .. })));
}

#[test]
fn test_exclusive_recreates_deleted_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let appender = open(
        path.clone(),
        AppenderOptions::default().with_recheck_interval(Duration::ZERO),
    );
    appender.write(b"before delete\n").unwrap();
    let first_birth = appender.birth_time().unwrap();

    fs::remove_file(&path).unwrap();
    std::thread::sleep(Duration::from_millis(10));
    appender.write(b"after\n").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "after\n");
    assert_eq!(appender.length(), Some(6));
    assert!(appender.birth_time().unwrap() > first_birth);
}

#[test]
fn test_exclusive_skips_recheck_within_interval() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let appender = open(
        path.clone(),
        AppenderOptions::default().with_recheck_interval(Duration::from_secs(3600)),
    );
    appender.write(b"a").unwrap();
    fs::remove_file(&path).unwrap();

    // Still writing to the unlinked handle
    appender.write(b"b").unwrap();
    assert!(!path.exists());
    assert_eq!(appender.length(), Some(2));
}

// ============================================================================
// Minimal
// ============================================================================

#[test]
fn test_minimal_reads_metadata_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");
    let appender = open(
        path.clone(),
        AppenderOptions::default().with_mode(LockingMode::Minimal),
    );

    appender.write(b"ours\n").unwrap();
    assert_eq!(appender.length(), Some(5));

    append_externally(&path, b"theirs\n");
    assert_eq!(appender.length(), Some(12));
    assert!(appender.last_write_time().is_some());
}

#[test]
fn test_minimal_length_unknown_after_delete() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");
    let appender = open(
        path.clone(),
        AppenderOptions::default().with_mode(LockingMode::Minimal),
    );
    fs::remove_file(&path).unwrap();

    assert_eq!(appender.length(), None);
    // Writing recreates it
    appender.write(b"back\n").unwrap();
    assert_eq!(appender.length(), Some(5));
}

// ============================================================================
// Cross-process
// ============================================================================

#[test]
fn test_cross_process_sees_other_writers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");
    let appender = open(
        path.clone(),
        AppenderOptions::default().with_mode(LockingMode::CrossProcess),
    );

    appender.write(b"one\n").unwrap();
    append_externally(&path, b"other process\n");
    appender.write(b"two\n").unwrap();

    assert_eq!(appender.length(), Some(22));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "one\nother process\ntwo\n"
    );
}

#[test]
fn test_cross_process_reports_lock_contention() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.log");
    let appender = open(
        path.clone(),
        AppenderOptions::default()
            .with_mode(LockingMode::CrossProcess)
            .with_lock_attempts(3, Duration::from_millis(1)),
    );

    let holder = OpenOptions::new().append(true).open(&path).unwrap();
    holder.lock_exclusive().unwrap();

    let err = appender.write(b"blocked\n").unwrap_err();
    assert!(matches!(err, FileError::LockContention { attempts: 3, .. }));

    FileExt::unlock(&holder).unwrap();
    appender.write(b"free\n").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "free\n");
}

// ============================================================================
// Lifecycle and archive
// ============================================================================

#[test]
fn test_write_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let appender = open(dir.path().join("app.log"), AppenderOptions::default());
    appender.close();

    assert!(appender.is_closed());
    assert!(matches!(appender.write(b"late"), Err(FileError::Closed { .. })));
    appender.flush().unwrap();
}

#[test]
fn test_archive_due_by_size() {
    let dir = TempDir::new().unwrap();
    let appender = open(
        dir.path().join("app.log"),
        AppenderOptions::default().with_archive(ArchivePolicy::default().with_above_size(10)),
    );
    let now = Local::now();

    assert!(!appender.is_archive_due(now));
    appender.write(b"0123456789").unwrap();
    assert!(appender.is_archive_due(now));
}

#[test]
fn test_archive_boundary_follows_birth_time() {
    let dir = TempDir::new().unwrap();
    let appender = open(
        dir.path().join("app.log"),
        AppenderOptions::default().with_archive(ArchivePolicy::every(ArchivePeriod::Day)),
    );

    let boundary = appender.next_archive_time().unwrap();
    assert!(boundary > Local::now());
    appender.next_archive_time();
    assert_eq!(appender.archive_recompute_count(), 1);

    appender.write(b"x").unwrap();
    assert!(!appender.is_archive_due(Local::now()));
    assert!(appender.is_archive_due(boundary + chrono::TimeDelta::seconds(1)));
}
