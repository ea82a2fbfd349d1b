//! Job store error types.

use thiserror::Error;

/// Result type for job store operations.
pub type JobStoreResult<T> = Result<T, JobStoreError>;

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict on batch {batch_id}")]
    VersionConflict { batch_id: String },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobStoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists(id.into())
    }

    pub fn version_conflict(batch_id: impl Into<String>) -> Self {
        Self::VersionConflict {
            batch_id: batch_id.into(),
        }
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// True if the error was caused by a concurrent writer winning the
    /// read-modify-write race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, JobStoreError::VersionConflict { .. })
    }
}
