//! Appender cache tests

use std::fs;
use std::thread;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use super::*;
use crate::file::locking::LockingMode;

fn cache(capacity: usize) -> FileAppenderCache {
    FileAppenderCache::new(capacity, AppenderOptions::default())
}

// ============================================================================
// Capacity and eviction
// ============================================================================

#[test]
fn test_never_exceeds_capacity() {
    let dir = TempDir::new().unwrap();
    let cache = cache(3);

    for i in 0..10 {
        cache.allocate(dir.path().join(format!("{i}.log"))).unwrap();
        assert_eq!(cache.len(), (i + 1).min(3));
    }
}

#[test]
fn test_evicts_least_recently_used() {
    let dir = TempDir::new().unwrap();
    let cache = cache(3);
    let a = cache.allocate(dir.path().join("a.log")).unwrap();
    let b = cache.allocate(dir.path().join("b.log")).unwrap();
    cache.allocate(dir.path().join("c.log")).unwrap();

    // Touch a so b becomes the oldest
    let a_again = cache.allocate(dir.path().join("a.log")).unwrap();
    assert!(Arc::ptr_eq(&a, &a_again));

    cache.allocate(dir.path().join("d.log")).unwrap();

    assert_eq!(
        cache.paths(),
        vec![
            dir.path().join("d.log"),
            dir.path().join("a.log"),
            dir.path().join("c.log"),
        ]
    );
    assert!(b.is_closed());
    assert!(!a.is_closed());
    assert!(matches!(
        cache.write(&b, b"late"),
        Err(FileError::Closed { .. })
    ));
}

#[test]
fn test_zero_capacity_fails_fast() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.log");
    let cache = cache(0);

    assert!(matches!(cache.allocate(&path), Err(FileError::EmptyCache)));
    assert!(matches!(
        cache.file_length(&path, true),
        Err(FileError::EmptyCache)
    ));
    assert!(matches!(
        cache.last_write_time(&path, true),
        Err(FileError::EmptyCache)
    ));
    assert!(!path.exists());
    assert_eq!(cache.close_appenders(None), 0);
}

#[test]
fn test_failed_open_leaves_cache_unchanged() {
    let dir = TempDir::new().unwrap();
    let cache = FileAppenderCache::new(1, AppenderOptions::default().with_create_dirs(false));
    let existing = cache.allocate(dir.path().join("a.log")).unwrap();

    // A directory cannot be opened for append
    let err = cache.allocate(dir.path()).unwrap_err();
    assert!(matches!(err, FileError::Open { .. }));

    assert_eq!(cache.paths(), vec![dir.path().join("a.log")]);
    assert!(!existing.is_closed());
}

// ============================================================================
// Writes and lifecycle
// ============================================================================

#[test]
fn test_length_reflects_write_in_every_mode() {
    for mode in [
        LockingMode::Exclusive,
        LockingMode::Minimal,
        LockingMode::CrossProcess,
    ] {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let cache = FileAppenderCache::new(2, AppenderOptions::default().with_mode(mode));

        let appender = cache.allocate(&path).unwrap();
        cache.write(&appender, b"hello\n").unwrap();
        cache.flush(&appender).unwrap();
        assert_eq!(cache.file_length(&path, false).unwrap(), Some(6), "{mode}");

        cache.write(&appender, b"world\n").unwrap();
        assert_eq!(cache.file_length(&path, false).unwrap(), Some(12), "{mode}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\nworld\n");
    }
}

#[test]
fn test_invalidate_closes_entry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.log");
    let cache = cache(2);
    let appender = cache.allocate(&path).unwrap();

    assert!(cache.invalidate(&path));
    assert!(!cache.invalidate(&path));
    assert!(appender.is_closed());
    assert!(!cache.contains(&path));

    // Reallocation opens a fresh appender
    let fresh = cache.allocate(&path).unwrap();
    assert!(!Arc::ptr_eq(&appender, &fresh));
}

#[test]
fn test_close_appenders_older_than() {
    let dir = TempDir::new().unwrap();
    let cache = cache(4);
    let old = cache.allocate(dir.path().join("old.log")).unwrap();
    thread::sleep(Duration::from_millis(20));
    let cutoff = SystemTime::now();
    thread::sleep(Duration::from_millis(20));
    let young = cache.allocate(dir.path().join("young.log")).unwrap();

    assert_eq!(cache.close_appenders(Some(cutoff)), 1);
    assert!(old.is_closed());
    assert!(!young.is_closed());
    assert_eq!(cache.paths(), vec![dir.path().join("young.log")]);

    assert_eq!(cache.close_appenders(None), 1);
    assert!(cache.is_empty());
}

#[test]
fn test_flush_all() {
    let dir = TempDir::new().unwrap();
    let cache = cache(3);
    for name in ["a.log", "b.log"] {
        let appender = cache.allocate(dir.path().join(name)).unwrap();
        cache.write(&appender, b"line\n").unwrap();
    }
    cache.flush_all().unwrap();
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn test_metadata_fallback_for_uncached_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("external.log");
    fs::write(&path, b"0123456789").unwrap();
    let cache = cache(2);

    assert_eq!(cache.file_length(&path, false).unwrap(), None);
    assert_eq!(cache.file_length(&path, true).unwrap(), Some(10));
    assert!(cache.last_write_time(&path, true).unwrap().is_some());

    let birth = cache.birth_time(&path, true).unwrap().unwrap();
    let modified = cache.last_write_time(&path, true).unwrap().unwrap();
    assert!(birth <= modified);
}

#[test]
fn test_metadata_of_missing_file_is_unknown() {
    let dir = TempDir::new().unwrap();
    let cache = cache(2);
    assert_eq!(
        cache.file_length(dir.path().join("nope.log"), true).unwrap(),
        None
    );
}

#[test]
fn test_concurrent_allocate_and_write() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(cache(2));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let path = dir.path().join(format!("{}.log", t % 3));
            thread::spawn(move || {
                for _ in 0..50 {
                    let appender = cache.allocate(&path).unwrap();
                    // Another thread may evict between allocate and write
                    match cache.write(&appender, b"x") {
                        Ok(()) | Err(FileError::Closed { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(cache.len() <= 2);
}
