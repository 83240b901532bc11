//! Worker error types.

use std::path::PathBuf;

use roomsense_engine::{EngineError, QueueError};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid rooms file {path}: {source}")]
    RoomsFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed detection on line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid detection: {0}")]
    InvalidDetection(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_detection(msg: impl Into<String>) -> Self {
        Self::InvalidDetection(msg.into())
    }

    /// Errors that skip one input line instead of stopping the replay.
    pub fn is_line_error(&self) -> bool {
        matches!(
            self,
            WorkerError::MalformedLine { .. }
                | WorkerError::InvalidDetection(_)
                | WorkerError::Image(_)
                | WorkerError::Queue(_)
        ) || matches!(self, WorkerError::Engine(e) if e.is_caller_error())
    }
}
