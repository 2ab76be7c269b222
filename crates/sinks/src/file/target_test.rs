//! File target tests

use std::fs;
use std::sync::Arc;
use std::sync::mpsc;

use chrono::{Local, TimeZone};
use scribe_pipeline::Target;
use scribe_protocol::{Continuation, ErrorKind, Event, Level};
use tempfile::TempDir;

use super::*;
use crate::file::archive::{ArchivePeriod, ArchivePolicy};

fn layout(template: &str) -> Layout {
    Layout::parse(template).unwrap()
}

fn target(dir: &TempDir, path: &str) -> FileTarget {
    let path = dir.path().join(path);
    FileTarget::new(
        "file",
        FileTargetConfig::new(layout(path.to_str().unwrap()))
            .with_layout(layout("${level}|${message}")),
    )
}

fn event(message: &str) -> Arc<Event> {
    Arc::new(Event::new(Level::Info, "app", message))
}

// ============================================================================
// Writing
// ============================================================================

#[test]
fn test_writes_rendered_lines() {
    let dir = TempDir::new().unwrap();
    let target = target(&dir, "app.log");

    target.write(&Event::new(Level::Warn, "app", "first")).unwrap();
    target.write_batch(&[event("second"), event("third")]).unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("app.log")).unwrap(),
        "warn|first\ninfo|second\ninfo|third\n"
    );
    assert_eq!(target.name(), "file");
}

#[test]
fn test_batch_split_by_rendered_path() {
    let dir = TempDir::new().unwrap();
    let template = format!("{}/${{property:tenant}}.log", dir.path().display());
    let target = FileTarget::new(
        "tenants",
        FileTargetConfig::new(layout(&template)).with_layout(layout("${message}")),
    );

    let tenant = |t: &str, m: &str| {
        Arc::new(Event::new(Level::Info, "app", m).with_property("tenant", t))
    };
    target
        .write_batch(&[
            tenant("a", "a1"),
            tenant("a", "a2"),
            tenant("b", "b1"),
            tenant("a", "a3"),
        ])
        .unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("a.log")).unwrap(), "a1\na2\na3\n");
    assert_eq!(fs::read_to_string(dir.path().join("b.log")).unwrap(), "b1\n");
    assert_eq!(target.cache().len(), 2);
}

#[test]
fn test_date_in_path() {
    let dir = TempDir::new().unwrap();
    let template = format!("{}/${{shortdate}}.log", dir.path().display());
    let target = FileTarget::new("daily", FileTargetConfig::new(layout(&template)));
    let at = Local.with_ymd_and_hms(2026, 6, 14, 9, 0, 0).single().unwrap();

    target
        .write(&Event::new(Level::Info, "app", "hello").with_timestamp(at))
        .unwrap();
    assert!(dir.path().join("2026-06-14.log").exists());
}

#[test]
fn test_zero_capacity_fails_permanently() {
    let dir = TempDir::new().unwrap();
    let target = FileTarget::new(
        "file",
        FileTargetConfig::new(layout(dir.path().join("a.log").to_str().unwrap()))
            .with_cache_capacity(0),
    );

    let err = target.write(&Event::new(Level::Info, "app", "x")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermanentTarget);
}

// ============================================================================
// Archiving
// ============================================================================

fn archiving_target(dir: &TempDir, policy: ArchivePolicy, max: Option<usize>) -> FileTarget {
    let mut config = FileTargetConfig::new(layout(dir.path().join("app.log").to_str().unwrap()))
        .with_layout(layout("${message}"))
        .with_appender(AppenderOptions::default().with_archive(policy));
    if let Some(max) = max {
        config = config.with_max_archive_files(max);
    }
    FileTarget::new("file", config)
}

#[test]
fn test_rolls_above_size() {
    let dir = TempDir::new().unwrap();
    let target = archiving_target(&dir, ArchivePolicy::default().with_above_size(6), None);

    // Each line is 6 bytes, so every write after the first rolls
    for message in ["line1", "line2", "line3"] {
        target.write(&Event::new(Level::Info, "app", message)).unwrap();
    }

    assert_eq!(target.archives_rolled(), 2);
    assert_eq!(fs::read_to_string(dir.path().join("app.1.log")).unwrap(), "line1\n");
    assert_eq!(fs::read_to_string(dir.path().join("app.2.log")).unwrap(), "line2\n");
    assert_eq!(fs::read_to_string(dir.path().join("app.log")).unwrap(), "line3\n");
}

#[test]
fn test_prunes_old_archives() {
    let dir = TempDir::new().unwrap();
    let target = archiving_target(&dir, ArchivePolicy::default().with_above_size(1), Some(2));

    for i in 0..5 {
        target.write(&Event::new(Level::Info, "app", format!("e{i}"))).unwrap();
    }

    assert_eq!(target.archives_rolled(), 4);
    assert!(!dir.path().join("app.1.log").exists());
    assert!(!dir.path().join("app.2.log").exists());
    assert_eq!(fs::read_to_string(dir.path().join("app.3.log")).unwrap(), "e2\n");
    assert_eq!(fs::read_to_string(dir.path().join("app.4.log")).unwrap(), "e3\n");
    assert_eq!(fs::read_to_string(dir.path().join("app.log")).unwrap(), "e4\n");
}

#[test]
fn test_rolls_on_day_boundary() {
    let dir = TempDir::new().unwrap();
    let target = archiving_target(&dir, ArchivePolicy::every(ArchivePeriod::Day), None);

    target.write(&Event::new(Level::Info, "app", "today")).unwrap();
    let tomorrow = Local::now() + chrono::TimeDelta::days(1);
    target
        .write(&Event::new(Level::Info, "app", "tomorrow").with_timestamp(tomorrow))
        .unwrap();

    assert_eq!(target.archives_rolled(), 1);
    assert_eq!(fs::read_to_string(dir.path().join("app.1.log")).unwrap(), "today\n");
    assert_eq!(fs::read_to_string(dir.path().join("app.log")).unwrap(), "tomorrow\n");
}

#[test]
fn test_archives_old_file_on_startup() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("app.log"), "previous run\n").unwrap();
    let path = dir.path().join("app.log");
    let target = FileTarget::new(
        "file",
        FileTargetConfig::new(layout(path.to_str().unwrap()))
            .with_layout(layout("${message}"))
            .with_archive_old_file_on_startup(true),
    );

    target.write(&Event::new(Level::Info, "app", "first")).unwrap();
    target.write(&Event::new(Level::Info, "app", "second")).unwrap();

    assert_eq!(target.archives_rolled(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("app.1.log")).unwrap(),
        "previous run\n"
    );
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[test]
fn test_startup_archive_skips_missing_and_empty_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("empty.log"), "").unwrap();
    let template = format!("{}/${{logger}}.log", dir.path().display());
    let target = FileTarget::new(
        "file",
        FileTargetConfig::new(layout(&template))
            .with_layout(layout("${message}"))
            .with_archive_old_file_on_startup(true),
    );

    target.write(&Event::new(Level::Info, "empty", "a")).unwrap();
    target.write(&Event::new(Level::Info, "fresh", "b")).unwrap();

    assert_eq!(target.archives_rolled(), 0);
    assert_eq!(fs::read_to_string(dir.path().join("empty.log")).unwrap(), "a\n");
    assert_eq!(fs::read_to_string(dir.path().join("fresh.log")).unwrap(), "b\n");
}

#[test]
fn test_archive_name() {
    assert_eq!(
        archive_name(Path::new("/var/log/app.log"), 3),
        PathBuf::from("/var/log/app.3.log")
    );
    assert_eq!(
        archive_name(Path::new("logs/trace"), 1),
        PathBuf::from("logs/trace.1")
    );
}

// ============================================================================
// Flush and close
// ============================================================================

#[test]
fn test_flush_completes_continuation() {
    let dir = TempDir::new().unwrap();
    let target = target(&dir, "app.log");
    target.write(&Event::new(Level::Info, "app", "x")).unwrap();

    let (tx, rx) = mpsc::channel();
    target.flush(Continuation::new(move |result| {
        let _ = tx.send(result);
    }));
    assert!(rx.try_recv().unwrap().is_ok());
}

#[test]
fn test_close_releases_appenders() {
    let dir = TempDir::new().unwrap();
    let target = target(&dir, "app.log");
    target.write(&Event::new(Level::Info, "app", "x")).unwrap();
    assert_eq!(target.cache().len(), 1);

    target.close();
    assert!(target.cache().is_empty());
}

#[test]
fn test_open_file_cache_timeout_closes_appenders() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    let target = FileTarget::new(
        "file",
        FileTargetConfig::new(layout(path.to_str().unwrap()))
            .with_layout(layout("${message}"))
            .with_open_file_cache_timeout(Duration::from_millis(30)),
    );
    target.initialize(&Timer::dedicated("file-sweep-test").unwrap());

    target.write(&Event::new(Level::Info, "app", "before")).unwrap();
    assert_eq!(target.cache().len(), 1);

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !target.cache().is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(target.cache().is_empty());

    // Reopened on the next write
    target.write(&Event::new(Level::Info, "app", "after")).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "before\nafter\n");
    target.close();
}

#[test]
fn test_no_sweep_without_timeout() {
    let dir = TempDir::new().unwrap();
    let target = target(&dir, "app.log");
    target.initialize(&Timer::dedicated("file-sweep-test").unwrap());

    target.write(&Event::new(Level::Info, "app", "x")).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(target.cache().len(), 1);
}
