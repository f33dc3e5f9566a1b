//! Error types for sync-engine.

use sync_client::{ListError, RegistryError, StorageError};
use sync_types::EventError;
use tokio::task::JoinError;

/// Main error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Region resolution error.
    #[error("region error: {0}")]
    Registry(#[from] RegistryError),

    /// Listing a bucket failed.
    #[error(transparent)]
    List(#[from] ListError),

    /// Copying an object failed.
    #[error("copy {source_bucket}/{key} -> {bucket}/{dest_key} failed: {source}")]
    Copy {
        /// Source bucket.
        source_bucket: String,
        /// Source key.
        key: String,
        /// Destination bucket.
        bucket: String,
        /// Destination key.
        dest_key: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// Touching an object failed.
    #[error("touch {bucket}/{key} failed: {source}")]
    Touch {
        /// Destination bucket.
        bucket: String,
        /// Destination key.
        key: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// Deleting an object failed.
    #[error("delete {bucket}/{key} failed: {source}")]
    Delete {
        /// Destination bucket.
        bucket: String,
        /// Destination key.
        key: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// A notification could not be processed.
    #[error("event error: {0}")]
    Event(#[from] EventError),

    /// A spawned action panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),
}

impl From<JoinError> for EngineError {
    fn from(err: JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
