//! Log event
//!
//! An `Event` is built at the call site and is read-only once handed to the
//! router. Pipelines share it as `Arc<Event>`; it is dropped when the last
//! pipeline holding it has completed its continuation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};

use crate::level::Level;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-wide sequence id
#[inline]
pub fn next_sequence_id() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Property value attached to an event
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Insertion-ordered property map
///
/// Event property sets are small, so a vector scan beats hashing. Setting an
/// existing key replaces the value in place and keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: Vec<(String, PropertyValue)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A structured log event
#[derive(Debug, Clone)]
pub struct Event {
    timestamp: DateTime<Local>,
    level: Level,
    source: Arc<str>,
    message: String,
    error: Option<String>,
    properties: Properties,
    sequence_id: u64,
}

impl Event {
    /// Create an event stamped with the current time and the next sequence id
    pub fn new(level: Level, source: impl Into<Arc<str>>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            source: source.into(),
            message: message.into(),
            error: None,
            properties: Properties::new(),
            sequence_id: next_sequence_id(),
        }
    }

    /// Override the timestamp (replayed or imported events)
    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach an error payload
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.set(key, value);
        self
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Dotted source (logger) name
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Shared handle to the source name
    #[inline]
    pub fn source_arc(&self) -> &Arc<str> {
        &self.source
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[inline]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    #[inline]
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod event_test;
