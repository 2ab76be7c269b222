//! Pipeline error types
//!
//! Construction-time errors only. Per-event delivery failures never surface
//! here; they travel through continuations as `DeliveryError`.

use std::io;

use scribe_routing::RoutingError;
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A target registered in the routing table has no pipeline
    #[error("no pipeline for target '{0}'")]
    MissingPipeline(String),

    /// Two pipelines were supplied for the same target
    #[error("duplicate pipeline for target '{0}'")]
    DuplicatePipeline(String),

    /// Routing table construction failed
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Not called from within a tokio runtime
    #[error("no tokio runtime available")]
    NoRuntime,

    /// Dedicated timer thread could not be spawned
    #[error("failed to start timer thread: {0}")]
    Timer(#[source] io::Error),

    /// Stages listed in an order that cannot make progress
    #[error("invalid stage order for pipeline '{pipeline}': {message}")]
    StageOrder { pipeline: String, message: String },
}

impl PipelineError {
    #[inline]
    pub fn missing_pipeline(target: impl Into<String>) -> Self {
        Self::MissingPipeline(target.into())
    }

    #[inline]
    pub fn duplicate_pipeline(target: impl Into<String>) -> Self {
        Self::DuplicatePipeline(target.into())
    }

    #[inline]
    pub fn stage_order(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageOrder {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::missing_pipeline("file");
        assert!(err.to_string().contains("'file'"));

        let err = PipelineError::duplicate_pipeline("console");
        assert!(err.to_string().contains("duplicate"));

        let err: PipelineError = RoutingError::invalid_pattern("a*b").into();
        assert!(err.to_string().contains("a*b"));

        let err = PipelineError::NoRuntime;
        assert!(err.to_string().contains("runtime"));

        let err = PipelineError::stage_order("file", "buffering below retrying");
        assert!(err.to_string().contains("'file'"));
    }
}
