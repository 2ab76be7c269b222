//! Diagnostic logging for the engine itself
//!
//! The engine reports through `tracing`. Applications that do not install
//! their own subscriber can call [`init_tracing`] with the `[log]` section of
//! the configuration.

use std::fs::OpenOptions;
use std::sync::Mutex;

use scribe_config::{LogConfig, LogFormat, LogOutput};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::{Result, ScribeError};

/// Install a global subscriber for the engine's own diagnostics
///
/// An unparsable filter falls back to `info`. Fails if a global subscriber is
/// already set.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let (writer, ansi) = make_writer(&config.output)?;
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_ansi(ansi)
        .with_writer(writer);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Console => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
    installed.map_err(|e| ScribeError::tracing(e.to_string()))
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.directives())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| ScribeError::tracing(format!("invalid log level: {e}")))
}

fn make_writer(output: &LogOutput) -> Result<(BoxMakeWriter, bool)> {
    Ok(match output {
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ScribeError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    })
}
