use std::path::PathBuf;

use thiserror::Error;

use crate::device::ComputeBackend;

/// Result alias for startup operations
pub type Result<T> = std::result::Result<T, StartupError>;

/// Errors that abort pipeline initialization.
///
/// Every variant is fatal: the initializer never retries and never
/// publishes a partially built bundle.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} is corrupt: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("invalid configuration in {}: {source}", path.display())]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error for {key}: {message}")]
    ConfigValue { key: String, message: String },

    #[error("{backend} device could not be opened: {message}")]
    Device {
        backend: ComputeBackend,
        message: String,
    },

    #[error("failed to load model from {}: {message}", path.display())]
    Model { path: PathBuf, message: String },

    #[error("failed to load tokenizer from {}: {message}", path.display())]
    Tokenizer { path: PathBuf, message: String },

    #[error("settings were already registered for this process")]
    AlreadyRegistered,

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl StartupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StartupError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        StartupError::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// A failed generation request.
///
/// Deliberately opaque: the cause is logged where it happens and callers
/// treat every failure the same way.
#[derive(Debug, Clone, Error)]
#[error("generation failed: {message}")]
pub struct GenerationError {
    message: String,
}

impl GenerationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The logged failure message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised by the async admission queue
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("generation worker has stopped")]
    Closed,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}
