//! Worker error types.
//!
//! Each fallible ingestion stage gets its own variant so job records and
//! metrics can say where a video died. What was already written before
//! the failure is tracked separately by the orchestrator; these errors
//! only carry the report.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Pipeline failed: {0}")]
    PipelineFailed(String),

    #[error("Embedding failed: {0}")]
    EmbedFailed(String),

    #[error("Indexing failed: {0}")]
    IndexFailed(String),

    #[error("Job store error: {0}")]
    JobStore(#[from] vidx_jobs::JobStoreError),
}

impl WorkerError {
    pub fn invalid_upload(msg: impl Into<String>) -> Self {
        Self::InvalidUpload(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn pipeline_failed(msg: impl Into<String>) -> Self {
        Self::PipelineFailed(msg.into())
    }

    pub fn embed_failed(chunk_id: &str, cause: impl std::fmt::Display) -> Self {
        Self::EmbedFailed(format!("chunk {chunk_id}: {cause}"))
    }

    pub fn index_failed(chunk_id: &str, cause: impl std::fmt::Display) -> Self {
        Self::IndexFailed(format!("chunk {chunk_id}: {cause}"))
    }

    /// Stage label for logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidUpload(_) => "validation",
            Self::UploadFailed(_) => "upload",
            Self::PipelineFailed(_) => "pipeline",
            Self::EmbedFailed(_) => "embedding",
            Self::IndexFailed(_) => "indexing",
            Self::JobStore(_) => "job_store",
        }
    }
}
