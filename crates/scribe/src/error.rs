//! Facade error types

use scribe_config::ConfigError;
use scribe_pipeline::PipelineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScribeError>;

#[derive(Debug, Error)]
pub enum ScribeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("cannot initialize tracing: {0}")]
    Tracing(String),

    #[error("cannot open log file '{path}': {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScribeError {
    pub fn tracing(message: impl Into<String>) -> Self {
        Self::Tracing(message.into())
    }
}
