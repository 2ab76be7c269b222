//! Console target - human-readable output on stdout or stderr
//!
//! # Example Output
//!
//! ```text
//! 2026-06-14 07:34:59.161|INFO|app.http|listening on 0.0.0.0:8080
//! 2026-06-14 07:34:59.162|ERROR|app.db|connection refused
//! ```
//!
//! With color enabled, errors are red, warnings yellow and trace dimmed.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

use owo_colors::{OwoColorize, Style};
use parking_lot::Mutex;
use scribe_pipeline::Target;
use scribe_protocol::{Continuation, DeliveryError, DeliveryResult, Event, Level};

use crate::layout::Layout;
use crate::util::StringPool;

/// Output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

impl FromStr for ConsoleStream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" | "out" => Ok(Self::Stdout),
            "stderr" | "err" | "error" => Ok(Self::Stderr),
            other => Err(format!("unknown console stream '{other}'")),
        }
    }
}

/// Configuration for the console target
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub stream: ConsoleStream,
    /// Enable colored output
    pub color: bool,
    pub layout: Layout,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            stream: ConsoleStream::Stdout,
            color: true,
            layout: Layout::default(),
        }
    }
}

impl ConsoleConfig {
    /// Config with colors disabled (for piped output)
    pub fn no_color() -> Self {
        Self {
            color: false,
            ..Self::default()
        }
    }

    pub fn with_stream(mut self, stream: ConsoleStream) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }
}

/// Style for a level
fn level_style(level: Level, enabled: bool) -> Style {
    if !enabled {
        return Style::new();
    }
    match level {
        Level::Fatal | Level::Error => Style::new().red(),
        Level::Warn => Style::new().yellow(),
        Level::Info | Level::Debug | Level::Off => Style::new(),
        Level::Trace => Style::new().dimmed(),
    }
}

pub struct ConsoleTarget {
    name: String,
    config: ConsoleConfig,
    out: Mutex<Box<dyn Write + Send>>,
    strings: StringPool,
}

impl ConsoleTarget {
    pub fn new(name: impl Into<String>, config: ConsoleConfig) -> Self {
        let out: Box<dyn Write + Send> = match config.stream {
            ConsoleStream::Stdout => Box::new(io::stdout()),
            ConsoleStream::Stderr => Box::new(io::stderr()),
        };
        Self::with_writer(name, config, out)
    }

    /// Console target writing to an arbitrary sink
    pub fn with_writer(
        name: impl Into<String>,
        config: ConsoleConfig,
        out: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            out: Mutex::new(out),
            strings: StringPool::default(),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    fn format_into(&self, event: &Event, text: &mut String) {
        let mut line = self.strings.get();
        self.config.layout.render(event, &mut line);
        let style = level_style(event.level(), self.config.color);
        let _ = writeln!(text, "{}", line.style(style));
        self.strings.put(line);
    }

    fn emit(&self, text: &str) -> DeliveryResult {
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())
            .map_err(|e| DeliveryError::from_io(format!("{} console", self.name), e))
    }
}

impl Target for ConsoleTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, event: &Event) -> DeliveryResult {
        let mut text = self.strings.get();
        self.format_into(event, &mut text);
        let result = self.emit(&text);
        self.strings.put(text);
        result
    }

    fn write_batch(&self, events: &[Arc<Event>]) -> DeliveryResult {
        let mut text = self.strings.get();
        for event in events {
            self.format_into(event, &mut text);
        }
        let result = self.emit(&text);
        self.strings.put(text);
        result
    }

    fn flush(&self, continuation: Continuation) {
        let result = self
            .out
            .lock()
            .flush()
            .map_err(|e| DeliveryError::from_io(format!("{} console", self.name), e));
        continuation.complete(result);
    }
}
