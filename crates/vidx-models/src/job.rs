//! Ingestion job records and terminal results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{BatchId, JobId, Namespace};
use crate::stats::PipelineStats;

/// Ingestion job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is actively being processed
    #[default]
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-chunk summary carried in a completed job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkDetail {
    /// Chunk identifier
    pub chunk_id: String,
    /// Start offset in seconds
    pub start_time: f64,
    /// End offset in seconds
    pub end_time: f64,
    /// Number of frames sampled
    pub frame_count: u32,
    /// Visual complexity in [0, 1]
    pub complexity_score: f64,
}

/// Terminal outcome of one ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    /// Job identifier
    pub job_id: JobId,
    /// Terminal status (completed or failed)
    pub status: JobStatus,
    /// Blob-store identifier of the uploaded source, when one was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_identifier: Option<String>,
    /// Filename as uploaded
    pub filename: String,
    /// Number of chunks indexed
    #[serde(default)]
    pub chunks: usize,
    /// Total frames sampled across all chunks
    #[serde(default)]
    pub total_frames: u64,
    /// Total sampled-frame memory in megabytes
    #[serde(default)]
    pub total_memory_mb: f64,
    /// Mean complexity across chunks
    #[serde(default)]
    pub avg_complexity: f64,
    /// Per-chunk summaries
    #[serde(default)]
    pub chunk_details: Vec<ChunkDetail>,
    /// Error message when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// Build a completed result from pipeline statistics.
    pub fn completed(
        job_id: JobId,
        filename: impl Into<String>,
        hashed_identifier: impl Into<String>,
        stats: &PipelineStats,
        chunk_details: Vec<ChunkDetail>,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Completed,
            hashed_identifier: Some(hashed_identifier.into()),
            filename: filename.into(),
            chunks: stats.chunks,
            total_frames: stats.total_frames,
            total_memory_mb: stats.total_memory_mb,
            avg_complexity: stats.avg_complexity,
            chunk_details,
            error: None,
        }
    }

    /// Build a failed result.
    pub fn failed(job_id: JobId, filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            hashed_identifier: None,
            filename: filename.into(),
            chunks: 0,
            total_frames: 0,
            total_memory_mb: 0.0,
            avg_complexity: 0.0,
            chunk_details: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// One video ingestion job, created at upload intake.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IngestionJob {
    /// Unique job ID
    pub job_id: JobId,

    /// Record discriminator, always `"video"` for ingestion jobs
    #[serde(default = "default_job_type")]
    pub job_type: String,

    /// Filename as uploaded
    pub filename: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Upload size in bytes
    pub size_bytes: u64,

    /// MIME type reported by the client
    pub content_type: String,

    /// Storage namespace
    pub namespace: Namespace,

    /// Parent batch, when this job is part of one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_batch_id: Option<BatchId>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Terminal result, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,

    /// Error message, set on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_job_type() -> String {
    "video".to_string()
}

impl IngestionJob {
    /// Create a new processing job record.
    pub fn new(
        job_id: JobId,
        filename: impl Into<String>,
        size_bytes: u64,
        content_type: impl Into<String>,
        namespace: Namespace,
        parent_batch_id: Option<BatchId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            job_type: default_job_type(),
            filename: filename.into(),
            status: JobStatus::Processing,
            size_bytes,
            content_type: content_type.into(),
            namespace,
            parent_batch_id,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    /// Mark as completed with its result.
    pub fn complete(mut self, result: JobResult) -> Self {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.updated_at = Utc::now();
        self
    }

    /// Mark as failed.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
