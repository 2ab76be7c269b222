//! Delivery error types
//!
//! Every per-event failure travels through a `Continuation` as a
//! `DeliveryError`. Errors are `Clone` so that a single batch failure can be
//! reported to every event in the batch.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result delivered to a continuation
pub type DeliveryResult = std::result::Result<(), DeliveryError>;

/// Coarse classification of a delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Disk or network hiccup, worth retrying
    TransientIo,
    /// Invalid path, permission denied, or retries exhausted
    PermanentTarget,
    /// Queue capacity exceeded
    Overflow,
    /// Cross-process lock contention
    ConcurrencyConflict,
    /// Configuration could not be loaded or validated
    Configuration,
    /// Event dropped because the pipeline is shutting down
    Shutdown,
    /// Shutdown drain or blocking enqueue ran out of time
    Timeout,
}

/// Failure reported to an event's continuation
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("transient I/O failure: {message}")]
    TransientIo {
        message: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    #[error("permanent target failure: {message}")]
    PermanentTarget {
        message: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    #[error("delivery failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<DeliveryError>,
    },

    #[error("queue overflow: {message}")]
    Overflow { message: String },

    #[error("lock contention on '{resource}'")]
    ConcurrencyConflict { resource: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("pipeline is shutting down")]
    Shutdown,

    #[error("timed out: {message}")]
    Timeout { message: String },

    #[error("continuation dropped without completion")]
    Abandoned,
}

impl DeliveryError {
    /// Create a TransientIo error without an underlying cause
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo {
            message: message.into(),
            source: None,
        }
    }

    /// Create a PermanentTarget error without an underlying cause
    #[inline]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentTarget {
            message: message.into(),
            source: None,
        }
    }

    /// Create an Overflow error
    #[inline]
    pub fn overflow(message: impl Into<String>) -> Self {
        Self::Overflow {
            message: message.into(),
        }
    }

    /// Create a ConcurrencyConflict error
    #[inline]
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            resource: resource.into(),
        }
    }

    /// Create a Configuration error
    #[inline]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a Timeout error
    #[inline]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Wrap the last failure of an exhausted retry sequence
    #[inline]
    pub fn retries_exhausted(attempts: u32, last: DeliveryError) -> Self {
        Self::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Classify an I/O error, keeping the message context
    pub fn from_io(context: impl Into<String>, err: io::Error) -> Self {
        let message = format!("{}: {}", context.into(), err);
        let source = Some(Arc::new(err));
        if is_permanent_io(source.as_deref()) {
            Self::PermanentTarget { message, source }
        } else {
            Self::TransientIo { message, source }
        }
    }

    /// Coarse error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientIo { .. } => ErrorKind::TransientIo,
            Self::PermanentTarget { .. } | Self::RetriesExhausted { .. } | Self::Abandoned => {
                ErrorKind::PermanentTarget
            }
            Self::Overflow { .. } => ErrorKind::Overflow,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Shutdown => ErrorKind::Shutdown,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether a retrying stage should attempt delivery again
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientIo | ErrorKind::ConcurrencyConflict | ErrorKind::Overflow
        )
    }
}

impl From<io::Error> for DeliveryError {
    fn from(err: io::Error) -> Self {
        Self::from_io("I/O error", err)
    }
}

fn is_permanent_io(err: Option<&io::Error>) -> bool {
    let Some(err) = err else {
        return false;
    };
    matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidFilename
            | io::ErrorKind::ReadOnlyFilesystem
            | io::ErrorKind::IsADirectory
    )
}

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;
