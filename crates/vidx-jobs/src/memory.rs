//! In-memory job store.
//!
//! Backs single-process deployments and tests. Records are cloned on
//! read so callers never observe a write mid-flight.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use vidx_models::{BatchId, BatchJob, IngestionJob, JobId, JobResult};

use crate::error::{JobStoreError, JobStoreResult};
use crate::store::JobStore;

/// [`JobStore`] held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, IngestionJob>>,
    batches: RwLock<HashMap<String, BatchJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &IngestionJob) -> JobStoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let key = job.job_id.as_str().to_string();
        if jobs.contains_key(&key) {
            return Err(JobStoreError::already_exists(key));
        }
        jobs.insert(key, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> JobStoreResult<Option<IngestionJob>> {
        Ok(self.jobs.read().await.get(job_id.as_str()).cloned())
    }

    async fn update_job(&self, job_id: &JobId, delta: Map<String, Value>) -> JobStoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get(job_id.as_str())
            .ok_or_else(|| JobStoreError::not_found(job_id.as_str()))?;

        let mut fields = match serde_json::to_value(job)? {
            Value::Object(fields) => fields,
            other => {
                return Err(JobStoreError::request_failed(format!(
                    "job record serialized to non-object: {}",
                    other
                )))
            }
        };
        for (key, value) in delta {
            fields.insert(key, value);
        }

        let mut merged: IngestionJob = serde_json::from_value(Value::Object(fields))?;
        merged.updated_at = Utc::now();
        jobs.insert(job_id.as_str().to_string(), merged);
        Ok(())
    }

    async fn set_completed(&self, job_id: &JobId, result: JobResult) -> JobStoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get(job_id.as_str())
            .ok_or_else(|| JobStoreError::not_found(job_id.as_str()))?
            .clone();
        jobs.insert(job_id.as_str().to_string(), job.complete(result));
        Ok(())
    }

    async fn set_failed(&self, job_id: &JobId, error: &str) -> JobStoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get(job_id.as_str())
            .ok_or_else(|| JobStoreError::not_found(job_id.as_str()))?
            .clone();
        jobs.insert(job_id.as_str().to_string(), job.fail(error));
        Ok(())
    }

    async fn create_batch(&self, batch: &BatchJob) -> JobStoreResult<()> {
        let mut batches = self.batches.write().await;
        let key = batch.batch_id.as_str().to_string();
        if batches.contains_key(&key) {
            return Err(JobStoreError::already_exists(key));
        }
        batches.insert(key, batch.clone());
        Ok(())
    }

    async fn get_batch(&self, batch_id: &BatchId) -> JobStoreResult<Option<BatchJob>> {
        Ok(self.batches.read().await.get(batch_id.as_str()).cloned())
    }

    async fn compare_and_swap_batch(
        &self,
        expected_version: u64,
        batch: &BatchJob,
    ) -> JobStoreResult<()> {
        let mut batches = self.batches.write().await;
        let key = batch.batch_id.as_str().to_string();
        let current = batches
            .get(&key)
            .ok_or_else(|| JobStoreError::not_found(&key))?;

        if current.version != expected_version {
            return Err(JobStoreError::version_conflict(key));
        }
        batches.insert(key, batch.clone());
        Ok(())
    }
}
