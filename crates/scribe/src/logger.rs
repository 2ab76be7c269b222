//! Named loggers
//!
//! A [`Logger`] is a cheap handle: a source name plus the shared router.
//! Level checks and routing read the live graph on every call, so loggers
//! created before a reload follow the new configuration.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use scribe_pipeline::EventRouter;
use scribe_protocol::{Event, Level, PropertyValue};

/// Handle for emitting events under one source name
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    router: Arc<EventRouter>,
}

impl Logger {
    pub(crate) fn new(name: &str, router: Arc<EventRouter>) -> Self {
        Self {
            name: Arc::from(name),
            router,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any target would receive an event at `level`
    pub fn is_enabled(&self, level: Level) -> bool {
        if level == Level::Off {
            return false;
        }
        let graph = self.router.routes().load();
        !graph.table().routes_for(&self.name).targets(level).is_empty()
    }

    /// Emit a message; returns the number of targets it was handed to
    pub fn log(&self, level: Level, message: impl Into<String>) -> usize {
        self.router
            .dispatch(Event::new(level, Arc::clone(&self.name), message))
    }

    pub fn trace(&self, message: impl Into<String>) -> usize {
        self.log(Level::Trace, message)
    }

    pub fn debug(&self, message: impl Into<String>) -> usize {
        self.log(Level::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) -> usize {
        self.log(Level::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> usize {
        self.log(Level::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) -> usize {
        self.log(Level::Error, message)
    }

    pub fn fatal(&self, message: impl Into<String>) -> usize {
        self.log(Level::Fatal, message)
    }

    /// Start an event with properties, an error or an explicit timestamp
    pub fn event(&self, level: Level, message: impl Into<String>) -> EventBuilder<'_> {
        EventBuilder {
            logger: self,
            event: Event::new(level, Arc::clone(&self.name), message),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("name", &self.name).finish()
    }
}

/// Event under construction; nothing is routed until [`send`](Self::send)
#[must_use = "events are only routed when sent"]
pub struct EventBuilder<'a> {
    logger: &'a Logger,
    event: Event,
}

impl EventBuilder<'_> {
    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.event = self.event.with_property(key, value);
        self
    }

    pub fn error(mut self, error: impl fmt::Display) -> Self {
        self.event = self.event.with_error(error);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.event = self.event.with_timestamp(timestamp);
        self
    }

    pub fn send(self) -> usize {
        self.logger.router.dispatch(self.event)
    }
}
