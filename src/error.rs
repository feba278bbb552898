//! Error types for taskgraph-core.

use thiserror::Error;

/// Result type alias using taskgraph-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during task store and snapshot operations.
///
/// Expected, frequent conditions around reference resolution (missing refs,
/// malformed tokens, cycles) are not represented here; those are returned as
/// tagged values from the resolver so callers can render field-level
/// feedback. This type covers operations that genuinely fail.
#[derive(Error, Debug)]
pub enum Error {
    /// Task store access failed
    #[error("task store error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Task missing from the store
    #[error("task `{task_id}` not found")]
    TaskNotFound { task_id: String },

    /// Feature missing from its owning task
    #[error("feature `{feature_id}` not found in task `{task_id}`")]
    FeatureNotFound { task_id: String, feature_id: String },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a task-not-found error.
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    /// Create a feature-not-found error.
    pub fn feature_not_found(
        task_id: impl Into<String>,
        feature_id: impl Into<String>,
    ) -> Self {
        Self::FeatureNotFound {
            task_id: task_id.into(),
            feature_id: feature_id.into(),
        }
    }
}
