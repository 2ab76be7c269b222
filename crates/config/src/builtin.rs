//! Factories for the built-in target types
//!
//! # Example
//!
//! ```toml
//! [targets.app]
//! type = "file"
//! path = "logs/${shortdate}.log"
//! layout = "${longdate}|${level:uppercase}|${logger}|${message}"
//! locking = "cross_process"
//! archive_every = "day"
//! archive_above_size = 10485760
//! max_archive_files = 14
//! archive_old_file_on_startup = true
//! open_file_cache_timeout = "30s"
//!
//! [targets.console]
//! stream = "stderr"
//! color = false
//!
//! [targets.recent]
//! type = "memory"
//! max_lines = 500
//!
//! [targets.bench]
//! type = "null"
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use scribe_pipeline::Target;
use scribe_sinks::file::{
    AppenderOptions, ArchivePeriod, ArchivePolicy, DEFAULT_CACHE_CAPACITY,
    DEFAULT_RECHECK_INTERVAL,
};
use scribe_sinks::{
    ConsoleConfig, ConsoleStream, ConsoleTarget, FileTarget, FileTargetConfig, Layout,
    LockingMode, MemoryConfig, MemoryTarget, NullTarget,
};
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::registry::TargetSettings;

fn parse_layout(settings: &TargetSettings<'_>, field: &'static str, template: &str) -> Result<Layout> {
    Layout::parse(template)
        .map_err(|e| ConfigError::invalid_value("target", settings.name(), field, e.to_string()))
}

fn optional_layout(settings: &TargetSettings<'_>, template: Option<&str>) -> Result<Layout> {
    match template {
        Some(template) => parse_layout(settings, "layout", template),
        None => Ok(Layout::default()),
    }
}

fn parse_field<T>(settings: &TargetSettings<'_>, field: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid_value("target", settings.name(), field, e.to_string()))
}

// =============================================================================
// File
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct FileSettings {
    /// File name layout; required
    path: Option<String>,
    layout: Option<String>,
    /// Default: exclusive
    locking: String,
    /// Default: none
    archive_every: String,
    archive_above_size: Option<u64>,
    max_archive_files: Option<usize>,
    /// Default: 5
    cache_capacity: usize,
    /// Default: true
    create_dirs: bool,
    /// How often an exclusive handle checks its file still exists
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    recheck_interval: Duration,
    /// "lf" or "crlf"
    /// Default: lf
    line_ending: String,
    /// Close files kept open longer than this
    /// Default: none
    #[serde(with = "humantime_serde")]
    open_file_cache_timeout: Option<Duration>,
    /// Default: false
    archive_old_file_on_startup: bool,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            path: None,
            layout: None,
            locking: LockingMode::default().as_str().to_string(),
            archive_every: ArchivePeriod::None.to_string(),
            archive_above_size: None,
            max_archive_files: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            create_dirs: true,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            line_ending: "lf".to_string(),
            open_file_cache_timeout: None,
            archive_old_file_on_startup: false,
        }
    }
}

pub(crate) fn file(settings: &TargetSettings<'_>) -> Result<Arc<dyn Target>> {
    let raw: FileSettings = settings.parse()?;
    let path = raw
        .path
        .as_deref()
        .ok_or_else(|| ConfigError::missing_field("target", settings.name(), "path"))?;
    let resolved = settings.resolve_path(path);
    let path_layout = parse_layout(settings, "path", &resolved.to_string_lossy())?;

    let mode: LockingMode = parse_field(settings, "locking", &raw.locking)?;
    let period: ArchivePeriod = parse_field(settings, "archive_every", &raw.archive_every)?;
    let mut archive = ArchivePolicy::every(period);
    if let Some(bytes) = raw.archive_above_size {
        archive = archive.with_above_size(bytes);
    }

    let line_ending = match raw.line_ending.to_ascii_lowercase().as_str() {
        "lf" | "\n" => "\n",
        "crlf" | "\r\n" => "\r\n",
        other => {
            return Err(ConfigError::invalid_value(
                "target",
                settings.name(),
                "line_ending",
                format!("expected 'lf' or 'crlf', got '{other}'"),
            ));
        }
    };

    let appender = AppenderOptions::default()
        .with_mode(mode)
        .with_archive(archive)
        .with_recheck_interval(raw.recheck_interval)
        .with_create_dirs(raw.create_dirs);

    let mut config = FileTargetConfig::new(path_layout)
        .with_layout(optional_layout(settings, raw.layout.as_deref())?)
        .with_appender(appender)
        .with_cache_capacity(raw.cache_capacity)
        .with_line_ending(line_ending)
        .with_archive_old_file_on_startup(raw.archive_old_file_on_startup);
    if let Some(max) = raw.max_archive_files {
        config = config.with_max_archive_files(max);
    }
    if let Some(timeout) = raw.open_file_cache_timeout {
        config = config.with_open_file_cache_timeout(timeout);
    }

    Ok(Arc::new(FileTarget::new(settings.name(), config)))
}

// =============================================================================
// Console
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ConsoleSettings {
    /// Default: stdout
    stream: String,
    /// Default: true
    color: bool,
    layout: Option<String>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            stream: "stdout".to_string(),
            color: true,
            layout: None,
        }
    }
}

pub(crate) fn console(settings: &TargetSettings<'_>) -> Result<Arc<dyn Target>> {
    let raw: ConsoleSettings = settings.parse()?;
    let stream: ConsoleStream = parse_field(settings, "stream", &raw.stream)?;
    let config = ConsoleConfig {
        stream,
        color: raw.color,
        layout: optional_layout(settings, raw.layout.as_deref())?,
    };
    Ok(Arc::new(ConsoleTarget::new(settings.name(), config)))
}

// =============================================================================
// Memory and null
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct MemorySettings {
    layout: Option<String>,
    max_lines: Option<usize>,
}

pub(crate) fn memory(settings: &TargetSettings<'_>) -> Result<Arc<dyn Target>> {
    let raw: MemorySettings = settings.parse()?;
    let mut config =
        MemoryConfig::default().with_layout(optional_layout(settings, raw.layout.as_deref())?);
    if let Some(max) = raw.max_lines {
        config = config.with_max_lines(max);
    }
    Ok(Arc::new(MemoryTarget::new(settings.name(), config)))
}

pub(crate) fn null(settings: &TargetSettings<'_>) -> Result<Arc<dyn Target>> {
    Ok(Arc::new(NullTarget::new(settings.name())))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use scribe_protocol::{Event, Level};
    use tempfile::TempDir;

    use super::*;

    fn table(toml: &str) -> toml::Table {
        toml.parse().unwrap()
    }

    #[test]
    fn test_file_target_resolves_relative_path() {
        let dir = TempDir::new().unwrap();
        let raw = table(
            r#"
path = "logs/app.log"
layout = "${message}"
archive_every = "day"
max_archive_files = 3
"#,
        );
        let settings = TargetSettings::new("app", "file", &raw, dir.path());
        let target = file(&settings).unwrap();

        target.write(&Event::new(Level::Info, "test", "hello")).unwrap();
        target.close();

        let written = std::fs::read_to_string(dir.path().join("logs/app.log")).unwrap();
        assert_eq!(written, "hello\n");
    }

    #[test]
    fn test_file_target_housekeeping_settings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.log"), "old\n").unwrap();
        let raw = table(
            r#"
path = "app.log"
layout = "${message}"
archive_old_file_on_startup = true
open_file_cache_timeout = "30s"
"#,
        );
        let settings = TargetSettings::new("app", "file", &raw, dir.path());
        let target = file(&settings).unwrap();

        target.write(&Event::new(Level::Info, "test", "new")).unwrap();
        target.close();

        assert_eq!(std::fs::read_to_string(dir.path().join("app.1.log")).unwrap(), "old\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("app.log")).unwrap(), "new\n");
    }

    #[test]
    fn test_file_target_requires_path() {
        let raw = toml::Table::new();
        let settings = TargetSettings::new("app", "file", &raw, Path::new("."));
        let Err(err) = file(&settings) else {
            panic!("file target without a path");
        };
        assert!(matches!(err, ConfigError::MissingField { field: "path", .. }));
    }

    #[test]
    fn test_file_target_rejects_bad_values() {
        for (toml, field) in [
            ("path = \"a.log\"\nlocking = \"sometimes\"", "locking"),
            ("path = \"a.log\"\narchive_every = \"fortnight\"", "archive_every"),
            ("path = \"a.log\"\nline_ending = \"cr\"", "line_ending"),
            ("path = \"${nope}.log\"", "path"),
        ] {
            let raw = table(toml);
            let settings = TargetSettings::new("app", "file", &raw, Path::new("."));
            match file(&settings).err() {
                Some(ConfigError::InvalidValue { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected invalid {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_console_settings() {
        let raw = table("stream = \"stderr\"\ncolor = false");
        let settings = TargetSettings::new("console", "console", &raw, Path::new("."));
        assert_eq!(console(&settings).unwrap().name(), "console");

        let raw = table("stream = \"printer\"");
        let settings = TargetSettings::new("console", "console", &raw, Path::new("."));
        assert!(console(&settings).is_err());
    }

    #[test]
    fn test_memory_and_null() {
        let raw = table("max_lines = 2\nlayout = \"${message}\"");
        let settings = TargetSettings::new("recent", "memory", &raw, Path::new("."));
        assert_eq!(memory(&settings).unwrap().name(), "recent");

        let raw = toml::Table::new();
        let settings = TargetSettings::new("bench", "null", &raw, Path::new("."));
        assert_eq!(null(&settings).unwrap().name(), "bench");
    }
}
