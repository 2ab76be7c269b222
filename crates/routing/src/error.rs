//! Routing error types

use thiserror::Error;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Errors that can occur while compiling a routing table
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// Rule references a target that was never registered
    #[error("rule '{pattern}' references unknown target '{name}'")]
    UnknownTarget {
        /// Name of the missing target
        name: String,
        /// Pattern of the offending rule
        pattern: String,
    },

    /// Target registered twice under the same name
    #[error("target '{name}' is registered more than once")]
    DuplicateTarget {
        /// Duplicated target name
        name: String,
    },

    /// Name pattern with a wildcard somewhere other than start or end
    #[error("invalid name pattern '{pattern}': '*' is only allowed at the start or end")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
    },

    /// Minimum level above maximum level
    #[error("rule '{pattern}' has min level {min} above max level {max}")]
    InvertedLevels {
        /// Pattern of the offending rule
        pattern: String,
        /// Configured minimum
        min: String,
        /// Configured maximum
        max: String,
    },

    /// More targets than a `TargetId` can address
    #[error("too many targets: {count} (max {max})")]
    TooManyTargets {
        /// Number of targets requested
        count: usize,
        /// Upper bound
        max: usize,
    },
}

impl RoutingError {
    /// Create an UnknownTarget error
    #[inline]
    pub fn unknown_target(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::UnknownTarget {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a DuplicateTarget error
    #[inline]
    pub fn duplicate_target(name: impl Into<String>) -> Self {
        Self::DuplicateTarget { name: name.into() }
    }

    /// Create an InvalidPattern error
    #[inline]
    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
        }
    }
}
