//! Internal diagnostics configuration
//!
//! Controls how scribe reports on itself (reload failures, dropped events,
//! file errors). This is separate from the targets it delivers to.

use serde::Deserialize;

/// Minimum level for internal diagnostics
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing level filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Diagnostic output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output (default)
    #[default]
    Console,
    /// JSON structured logging
    Json,
}

/// Diagnostic output destination
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stderr,
    Stdout,
    /// Append to a file
    #[serde(untagged)]
    File(String),
}

/// Diagnostics configuration
///
/// # Example
///
/// ```toml
/// [log]
/// level = "info"
/// format = "console"
/// output = "stderr"
/// filter = "scribe_config=debug"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Default: info
    pub level: LogLevel,

    /// Default: console
    pub format: LogFormat,

    /// Default: stderr, so diagnostics never interleave with a stdout target
    pub output: LogOutput,

    /// Extra `EnvFilter` directives appended after the level
    pub filter: Option<String>,
}

impl LogConfig {
    /// Filter directive string: the level, then any extra directives
    pub fn directives(&self) -> String {
        match self.filter.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{},{extra}", self.level.as_str()),
            _ => self.level.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Console);
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.directives(), "info");
    }

    #[test]
    fn test_deserialize_empty() {
        let config: LogConfig = toml::from_str("").unwrap();
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
level = "debug"
format = "json"
output = "stdout"
filter = "scribe_pipeline=trace"
"#;
        let config: LogConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
        assert_eq!(config.directives(), "debug,scribe_pipeline=trace");
    }

    #[test]
    fn test_file_output() {
        let config: LogConfig = toml::from_str(r#"output = "/var/log/scribe.log""#).unwrap();
        assert_eq!(config.output, LogOutput::File("/var/log/scribe.log".into()));
    }

    #[test]
    fn test_blank_filter_ignored() {
        let config = LogConfig {
            level: LogLevel::Warn,
            filter: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(config.directives(), "warn");
    }
}
