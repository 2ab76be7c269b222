//! File layer errors

use std::io;
use std::path::{Path, PathBuf};

use scribe_protocol::DeliveryError;
use thiserror::Error;

/// Result type for file operations
pub type Result<T> = std::result::Result<T, FileError>;

/// Failure in the appender cache or a file target
#[derive(Debug, Error)]
pub enum FileError {
    /// Cache was built with capacity 0
    #[error("appender cache has no capacity")]
    EmptyCache,

    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush '{path}': {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not lock '{path}' after {attempts} attempts")]
    LockContention { path: PathBuf, attempts: u32 },

    /// Handle was evicted or invalidated while the caller still held it
    #[error("appender for '{path}' is closed")]
    Closed { path: PathBuf },

    #[error("failed to archive '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

impl FileError {
    #[inline]
    pub fn open(path: &Path, source: io::Error) -> Self {
        Self::Open {
            path: path.to_path_buf(),
            source,
        }
    }

    #[inline]
    pub fn write(path: &Path, source: io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    #[inline]
    pub fn flush(path: &Path, source: io::Error) -> Self {
        Self::Flush {
            path: path.to_path_buf(),
            source,
        }
    }

    #[inline]
    pub fn archive(path: &Path, source: io::Error) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            source,
        }
    }

    #[inline]
    pub fn closed(path: &Path) -> Self {
        Self::Closed {
            path: path.to_path_buf(),
        }
    }

    #[inline]
    pub fn invalid_setting(message: impl Into<String>) -> Self {
        Self::InvalidSetting(message.into())
    }
}

impl From<FileError> for DeliveryError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::Open { path, source }
            | FileError::Write { path, source }
            | FileError::Flush { path, source }
            | FileError::Archive { path, source } => {
                DeliveryError::from_io(path.display().to_string(), source)
            }
            FileError::LockContention { path, .. } => {
                DeliveryError::conflict(path.display().to_string())
            }
            FileError::Closed { path } => {
                DeliveryError::transient(format!("appender for '{}' closed", path.display()))
            }
            FileError::EmptyCache => DeliveryError::permanent("appender cache has no capacity"),
            FileError::InvalidSetting(message) => DeliveryError::configuration(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use scribe_protocol::ErrorKind;

    use super::*;

    #[test]
    fn test_delivery_error_classification() {
        let path = Path::new("/var/log/app.log");
        let cases = [
            (
                FileError::write(path, io::Error::from(io::ErrorKind::StorageFull)),
                ErrorKind::TransientIo,
            ),
            (
                FileError::open(path, io::Error::from(io::ErrorKind::PermissionDenied)),
                ErrorKind::PermanentTarget,
            ),
            (
                FileError::LockContention {
                    path: path.to_path_buf(),
                    attempts: 10,
                },
                ErrorKind::ConcurrencyConflict,
            ),
            (FileError::closed(path), ErrorKind::TransientIo),
            (FileError::EmptyCache, ErrorKind::PermanentTarget),
            (
                FileError::invalid_setting("capacity"),
                ErrorKind::Configuration,
            ),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            assert_eq!(DeliveryError::from(err).kind(), expected, "{message}");
        }
    }
}
