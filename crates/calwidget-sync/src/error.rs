//! Sync error types.

use std::io;
use std::path::PathBuf;

use calwidget_google::ProviderError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while loading, refreshing or caching widget data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// IO error (cache or config file).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The cache file could not be written.
    #[error("Cache error at {path}: {message}")]
    Cache { path: PathBuf, message: String },

    /// A task the UI referred to is not in the current dataset.
    #[error("Task not found: {tasklist_id}/{task_id}")]
    TaskNotFound { tasklist_id: String, task_id: String },

    /// An event the UI referred to is not in the current dataset.
    #[error("Event not found: {0}")]
    EventNotFound(String),
}

impl SyncError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a cache error.
    pub fn cache(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Cache {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a task not found error.
    pub fn task_not_found(tasklist_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            tasklist_id: tasklist_id.into(),
            task_id: task_id.into(),
        }
    }

    /// Returns the provider error, if this is one.
    pub fn as_provider(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(e) => Some(e),
            _ => None,
        }
    }
}
