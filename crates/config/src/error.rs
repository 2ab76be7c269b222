//! Configuration error types

use std::io;

use scribe_pipeline::PipelineError;
use scribe_routing::RoutingError;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading configuration or building a route graph
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Target declared with a type no factory is registered for
    #[error("target '{name}' has unknown type '{type_name}'")]
    UnknownTargetType {
        /// Name of the target
        name: String,
        /// Declared type
        type_name: String,
    },

    /// The same target name declared twice across the main file and includes
    #[error("target '{0}' is declared more than once")]
    DuplicateTarget(String),

    /// Validation error - required field missing
    #[error("{component} '{name}' is missing required field '{field}'")]
    MissingField {
        /// Component type (e.g., "target", "rule")
        component: &'static str,
        /// Name of the component
        name: String,
        /// Missing field name
        field: &'static str,
    },

    /// Validation error - invalid value
    #[error("{component} '{name}' has invalid {field}: {message}")]
    InvalidValue {
        /// Component type
        component: &'static str,
        /// Name of the component
        name: String,
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },

    /// Rules could not be compiled
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Pipelines could not be built or paired with the routing table
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ConfigError {
    #[inline]
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    #[inline]
    pub fn parse(path: impl Into<String>, source: toml::de::Error) -> Self {
        Self::ParseError {
            path: path.into(),
            source,
        }
    }

    #[inline]
    pub fn unknown_target_type(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownTargetType {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    #[inline]
    pub fn duplicate_target(name: impl Into<String>) -> Self {
        Self::DuplicateTarget(name.into())
    }

    /// Create a MissingField error
    pub fn missing_field(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self::MissingField {
            component,
            name: name.into(),
            field,
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        component: &'static str,
        name: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            component,
            name: name.into(),
            field,
            message: message.into(),
        }
    }
}
