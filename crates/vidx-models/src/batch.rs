//! Batch aggregation records.
//!
//! A [`BatchJob`] is the one record in the system with multiple concurrent
//! writers: every child job folds its terminal result into it. The fold
//! itself is plain data transformation and lives here; the optimistic
//! version-checked write loop around it lives in the job-store crate.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{BatchId, JobId, Namespace};
use crate::job::{JobResult, JobStatus};

/// Aggregate status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Children are still processing
    #[default]
    Processing,
    /// All children completed successfully
    Completed,
    /// All children reported, some completed and some failed
    Partial,
    /// All children reported, none completed
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Processing)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of a successfully completed child job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompletedChild {
    /// Child job identifier
    pub job_id: JobId,
    /// Filename as uploaded
    pub filename: String,
    /// Chunks indexed by the child
    pub chunks: usize,
    /// Frames sampled by the child
    pub frames: u64,
}

/// Summary of a failed child job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FailedChild {
    /// Child job identifier
    pub job_id: JobId,
    /// Filename as uploaded
    pub filename: String,
    /// Error message
    pub error: String,
}

/// Parent record for a group of independently processed videos.
///
/// Created before any child is spawned, so the record always exists by the
/// time the first child could complete. `version` is the optimistic
/// concurrency token checked on every write.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchJob {
    /// Unique batch ID
    pub batch_id: BatchId,

    /// Record discriminator, always `"batch"`
    #[serde(default = "default_job_type")]
    pub job_type: String,

    /// Storage namespace shared by all children
    pub namespace: Namespace,

    /// Child job ids, fixed at creation
    pub child_job_ids: Vec<JobId>,

    /// Number of children, fixed at creation
    pub total_videos: u32,

    /// Children that completed successfully
    #[serde(default)]
    pub completed_count: u32,

    /// Children that failed
    #[serde(default)]
    pub failed_count: u32,

    /// Children still processing
    #[serde(default)]
    pub processing_count: u32,

    /// Chunks indexed across completed children
    #[serde(default)]
    pub total_chunks: u64,

    /// Frames sampled across completed children
    #[serde(default)]
    pub total_frames: u64,

    /// Sampled-frame memory across completed children, megabytes
    #[serde(default)]
    pub total_memory_mb: f64,

    /// Running mean complexity across completed children
    #[serde(default)]
    pub avg_complexity: f64,

    /// Aggregate status
    #[serde(default)]
    pub status: BatchStatus,

    /// Summaries of completed children
    #[serde(default)]
    pub completed_jobs: Vec<CompletedChild>,

    /// Summaries of failed children
    #[serde(default)]
    pub failed_jobs: Vec<FailedChild>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency token, bumped on every successful write
    #[serde(default)]
    pub version: u64,
}

fn default_job_type() -> String {
    "batch".to_string()
}

impl BatchJob {
    /// Create the initial batch record: all children counted as processing,
    /// every aggregate zeroed, version 0.
    pub fn new(batch_id: BatchId, child_job_ids: Vec<JobId>, namespace: Namespace) -> Self {
        let now = Utc::now();
        let total = child_job_ids.len() as u32;
        Self {
            batch_id,
            job_type: default_job_type(),
            namespace,
            child_job_ids,
            total_videos: total,
            completed_count: 0,
            failed_count: 0,
            processing_count: total,
            total_chunks: 0,
            total_frames: 0,
            total_memory_mb: 0.0,
            avg_complexity: 0.0,
            status: BatchStatus::Processing,
            completed_jobs: Vec::new(),
            failed_jobs: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Fold one child's terminal result into the aggregate and recompute
    /// the batch status. Anything other than a completed result counts as
    /// a failure.
    pub fn apply_child_result(&mut self, result: &JobResult) {
        match result.status {
            JobStatus::Completed => {
                self.completed_count += 1;
                self.total_chunks += result.chunks as u64;
                self.total_frames += result.total_frames;
                self.total_memory_mb += result.total_memory_mb;
                let n = f64::from(self.completed_count);
                self.avg_complexity =
                    (self.avg_complexity * (n - 1.0) + result.avg_complexity) / n;
                self.completed_jobs.push(CompletedChild {
                    job_id: result.job_id.clone(),
                    filename: result.filename.clone(),
                    chunks: result.chunks,
                    frames: result.total_frames,
                });
            }
            _ => {
                self.failed_count += 1;
                self.failed_jobs.push(FailedChild {
                    job_id: result.job_id.clone(),
                    filename: result.filename.clone(),
                    error: result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }
        self.processing_count = self.processing_count.saturating_sub(1);
        self.recompute_status();
        self.updated_at = Utc::now();
    }

    /// True once every child has reported a terminal result.
    pub fn all_reported(&self) -> bool {
        self.completed_count + self.failed_count >= self.total_videos
    }

    fn recompute_status(&mut self) {
        if !self.all_reported() {
            self.status = BatchStatus::Processing;
        } else if self.failed_count == 0 {
            self.status = BatchStatus::Completed;
        } else if self.completed_count == 0 {
            self.status = BatchStatus::Failed;
        } else {
            self.status = BatchStatus::Partial;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::PipelineStats;

    fn new_batch(children: usize) -> BatchJob {
        let ids = (0..children)
            .map(|i| JobId::from(format!("job-{}", i)))
            .collect();
        BatchJob::new(BatchId::from("batch-1"), ids, Namespace::from("ns"))
    }

    fn completed(job: &str, chunks: usize, frames: u64, complexity: f64) -> JobResult {
        let stats = PipelineStats {
            chunks,
            total_frames: frames,
            total_memory_mb: 1.0,
            avg_complexity: complexity,
        };
        JobResult::completed(JobId::from(job), format!("{job}.mp4"), "hash", &stats, Vec::new())
    }

    #[test]
    fn test_initial_record() {
        let batch = new_batch(3);
        assert_eq!(batch.total_videos, 3);
        assert_eq!(batch.processing_count, 3);
        assert_eq!(batch.status, BatchStatus::Processing);
        assert_eq!(batch.version, 0);
    }

    #[test]
    fn test_all_completed() {
        let mut batch = new_batch(2);
        batch.apply_child_result(&completed("job-0", 3, 30, 0.2));
        assert_eq!(batch.status, BatchStatus::Processing);

        batch.apply_child_result(&completed("job-1", 1, 10, 0.6));
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.completed_count, 2);
        assert_eq!(batch.processing_count, 0);
        assert_eq!(batch.total_chunks, 4);
        assert_eq!(batch.total_frames, 40);
        assert!((batch.avg_complexity - 0.4).abs() < 1e-9);
        assert_eq!(batch.completed_jobs.len(), 2);
    }

    #[test]
    fn test_mixed_outcome_is_partial() {
        let mut batch = new_batch(3);
        batch.apply_child_result(&completed("job-0", 1, 5, 0.5));
        batch.apply_child_result(&JobResult::failed(
            JobId::from("job-1"),
            "job-1.mp4",
            "boom",
        ));
        batch.apply_child_result(&completed("job-2", 2, 8, 0.1));

        assert_eq!(batch.status, BatchStatus::Partial);
        assert_eq!(batch.completed_count, 2);
        assert_eq!(batch.failed_count, 1);
        assert_eq!(batch.failed_jobs.len(), 1);
        assert_eq!(batch.failed_jobs[0].error, "boom");
        assert_eq!(batch.completed_count + batch.failed_count, batch.total_videos);
    }

    #[test]
    fn test_all_failed() {
        let mut batch = new_batch(2);
        batch.apply_child_result(&JobResult::failed(JobId::from("job-0"), "a.mp4", "x"));
        batch.apply_child_result(&JobResult::failed(JobId::from("job-1"), "b.mp4", "y"));
        assert_eq!(batch.status, BatchStatus::Failed);
    }

    #[test]
    fn test_non_terminal_result_counts_as_failure() {
        let mut batch = new_batch(1);
        let mut result = completed("job-0", 1, 1, 0.0);
        result.status = JobStatus::Processing;
        batch.apply_child_result(&result);

        assert_eq!(batch.failed_count, 1);
        assert_eq!(batch.failed_jobs[0].error, "unknown error");
        assert_eq!(batch.status, BatchStatus::Failed);
    }

    #[test]
    fn test_processing_count_never_underflows() {
        let mut batch = new_batch(1);
        batch.apply_child_result(&completed("job-0", 1, 1, 0.0));
        batch.apply_child_result(&completed("job-0", 1, 1, 0.0));
        assert_eq!(batch.processing_count, 0);
    }
}
