//! Text layouts
//!
//! A layout is a template with `${name}` or `${name:option}` placeholders,
//! parsed once and rendered per event into a reusable `String`:
//!
//! | placeholder | output |
//! |-------------|--------|
//! | `${longdate}` | `2026-06-14 15:30:12.042` |
//! | `${shortdate}` | `2026-06-14` |
//! | `${date}` | `2026/06/14 15:30:12.042` |
//! | `${time}` | `15:30:12.042` |
//! | `${level}` / `${level:uppercase}` | `info` / `INFO` |
//! | `${logger}` / `${source}` | event source |
//! | `${message}` / `${message:withexception}` | message, optionally followed by the error |
//! | `${error}` / `${exception}` | error payload, empty when absent |
//! | `${property:key}` | property value, empty when absent |
//! | `${seq}` | event sequence id |
//! | `${newline}` | `\n` |
//!
//! File targets use the same syntax for their path, so `logs/${shortdate}.log`
//! starts a new file every day.

use std::fmt::{self, Write};

use scribe_protocol::Event;
use thiserror::Error;

/// Layout used when none is configured
pub const DEFAULT_LAYOUT: &str = "${longdate}|${level:uppercase}|${logger}|${message:withexception}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown layout renderer '${{{0}}}'")]
    UnknownRenderer(String),

    #[error("unterminated '${{' at offset {0}")]
    Unterminated(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    LongDate,
    ShortDate,
    Date,
    Time,
    Level { uppercase: bool },
    Source,
    Message { with_error: bool },
    Error,
    Property(String),
    Sequence,
}

/// Parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    template: String,
    parts: Vec<Part>,
}

impl Layout {
    pub fn parse(template: &str) -> Result<Self, LayoutError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find("${") {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or(LayoutError::Unterminated(offset + start))?;
            let part = parse_renderer(&after[..end])?;

            match part {
                Part::Literal(text) => literal.push_str(&text),
                part => {
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(part);
                }
            }
            offset += start + 2 + end + 1;
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            parts,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// True when rendering does not depend on the event
    pub fn is_fixed(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// Append the rendered event to `out`
    pub fn render(&self, event: &Event, out: &mut String) {
        for part in &self.parts {
            // Writing into a String cannot fail
            let _ = render_part(part, event, out);
        }
    }

    /// Render into a fresh string
    pub fn render_to_string(&self, event: &Event) -> String {
        let mut out = String::with_capacity(self.template.len() + 64);
        self.render(event, &mut out);
        out
    }
}

impl Default for Layout {
    fn default() -> Self {
        // Static template, parse cannot fail
        Self::parse(DEFAULT_LAYOUT).unwrap_or_else(|_| Self {
            template: String::new(),
            parts: Vec::new(),
        })
    }
}

impl std::str::FromStr for Layout {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn parse_renderer(spec: &str) -> Result<Part, LayoutError> {
    let (name, option) = match spec.split_once(':') {
        Some((name, option)) => (name.trim(), Some(option.trim())),
        None => (spec.trim(), None),
    };
    let flag = |expected: &str| option.is_some_and(|o| o.eq_ignore_ascii_case(expected));

    let part = match name.to_ascii_lowercase().as_str() {
        "longdate" => Part::LongDate,
        "shortdate" => Part::ShortDate,
        "date" => Part::Date,
        "time" => Part::Time,
        "level" => Part::Level {
            uppercase: flag("uppercase"),
        },
        "logger" | "source" => Part::Source,
        "message" => Part::Message {
            with_error: flag("withexception"),
        },
        "error" | "exception" => Part::Error,
        "property" | "event-property" => match option {
            Some(key) if !key.is_empty() => Part::Property(key.to_string()),
            _ => return Err(LayoutError::UnknownRenderer(spec.to_string())),
        },
        "seq" | "sequenceid" => Part::Sequence,
        "newline" => Part::Literal("\n".to_string()),
        _ => return Err(LayoutError::UnknownRenderer(spec.to_string())),
    };
    Ok(part)
}

fn render_part(part: &Part, event: &Event, out: &mut String) -> fmt::Result {
    let ts = event.timestamp();
    match part {
        Part::Literal(text) => out.push_str(text),
        Part::LongDate => write!(out, "{}", ts.format("%Y-%m-%d %H:%M:%S%.3f"))?,
        Part::ShortDate => write!(out, "{}", ts.format("%Y-%m-%d"))?,
        Part::Date => write!(out, "{}", ts.format("%Y/%m/%d %H:%M:%S%.3f"))?,
        Part::Time => write!(out, "{}", ts.format("%H:%M:%S%.3f"))?,
        Part::Level { uppercase: true } => {
            out.push_str(&event.level().as_str().to_ascii_uppercase())
        }
        Part::Level { uppercase: false } => out.push_str(event.level().as_str()),
        Part::Source => out.push_str(event.source()),
        Part::Message { with_error } => {
            out.push_str(event.message());
            if *with_error && let Some(error) = event.error() {
                out.push(' ');
                out.push_str(error);
            }
        }
        Part::Error => out.push_str(event.error().unwrap_or_default()),
        Part::Property(key) => {
            if let Some(value) = event.properties().get(key) {
                write!(out, "{value}")?;
            }
        }
        Part::Sequence => write!(out, "{}", event.sequence_id())?,
    }
    Ok(())
}

#[cfg(test)]
#[path = "layout_test.rs"]
mod layout_test;
