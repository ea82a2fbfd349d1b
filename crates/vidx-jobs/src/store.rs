//! The job store interface.

use async_trait::async_trait;
use serde_json::{Map, Value};
use vidx_models::{BatchId, BatchJob, IngestionJob, JobId, JobResult};

use crate::error::JobStoreResult;

/// Durable store for ingestion jobs and batch records.
///
/// Batch writes go through [`JobStore::compare_and_swap_batch`] because
/// children of one batch finish concurrently against the same record;
/// everything else is last-writer-wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job record. Fails if the id already exists.
    async fn create_job(&self, job: &IngestionJob) -> JobStoreResult<()>;

    /// Fetch a job by id.
    async fn get_job(&self, job_id: &JobId) -> JobStoreResult<Option<IngestionJob>>;

    /// Shallow-merge a field delta into an existing job record.
    async fn update_job(&self, job_id: &JobId, delta: Map<String, Value>) -> JobStoreResult<()>;

    /// Mark a job completed with its result.
    async fn set_completed(&self, job_id: &JobId, result: JobResult) -> JobStoreResult<()>;

    /// Mark a job failed with an error message.
    async fn set_failed(&self, job_id: &JobId, error: &str) -> JobStoreResult<()>;

    /// Persist a new batch record. Fails if the id already exists.
    async fn create_batch(&self, batch: &BatchJob) -> JobStoreResult<()>;

    /// Fetch a batch by id.
    async fn get_batch(&self, batch_id: &BatchId) -> JobStoreResult<Option<BatchJob>>;

    /// Replace a batch record only if its stored version still equals
    /// `expected_version`; otherwise fail with a version conflict.
    async fn compare_and_swap_batch(
        &self,
        expected_version: u64,
        batch: &BatchJob,
    ) -> JobStoreResult<()>;
}
