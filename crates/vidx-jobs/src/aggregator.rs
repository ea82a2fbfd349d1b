//! Batch aggregation over concurrent child completions.
//!
//! Children of one batch finish in any order and fold their results into
//! the shared batch record through an optimistic read-modify-write. A
//! conflicting writer triggers a bounded retry; exhausting the retries
//! leaves the aggregate stale but never fails the child's own job.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};
use vidx_models::{BatchId, BatchJob, JobId, JobResult, Namespace};

use crate::error::{JobStoreError, JobStoreResult};
use crate::store::JobStore;

/// Maximum retries for a contended batch update.
const MAX_UPDATE_ATTEMPTS: u32 = 10;

/// Folds child job results into their parent batch record.
pub struct BatchAggregator {
    store: Arc<dyn JobStore>,
    max_attempts: u32,
}

impl BatchAggregator {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            max_attempts: MAX_UPDATE_ATTEMPTS,
        }
    }

    /// Override the retry bound.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Write the initial batch record.
    ///
    /// Runs before any child starts, so the record exists by the time
    /// the first child could report.
    pub async fn create_batch(
        &self,
        batch_id: BatchId,
        child_job_ids: Vec<JobId>,
        namespace: Namespace,
    ) -> JobStoreResult<BatchJob> {
        let batch = BatchJob::new(batch_id, child_job_ids, namespace);
        self.store.create_batch(&batch).await?;
        info!(
            batch_id = %batch.batch_id,
            videos = batch.total_videos,
            "created batch record"
        );
        Ok(batch)
    }

    /// Fold one child's terminal result into the batch.
    ///
    /// Returns whether the update was applied. `Ok(false)` means the
    /// retry budget was exhausted and the aggregate may be stale; the
    /// caller logs it and moves on.
    pub async fn on_child_done(
        &self,
        batch_id: &BatchId,
        result: &JobResult,
    ) -> JobStoreResult<bool> {
        for attempt in 0..self.max_attempts {
            let current = self
                .store
                .get_batch(batch_id)
                .await?
                .ok_or_else(|| JobStoreError::not_found(batch_id.as_str()))?;

            let mut updated = current.clone();
            updated.apply_child_result(result);
            updated.version = current.version + 1;

            match self
                .store
                .compare_and_swap_batch(current.version, &updated)
                .await
            {
                Ok(()) => {
                    if updated.all_reported() {
                        info!(
                            batch_id = %batch_id,
                            status = %updated.status,
                            completed = updated.completed_count,
                            failed = updated.failed_count,
                            "batch finished"
                        );
                    }
                    return Ok(true);
                }
                Err(e) if e.is_conflict() => {
                    // Another child won the write; re-read and retry
                    // immediately. The losing writer sees the fresh
                    // version on its next read, so waiting buys nothing.
                    debug!(
                        batch_id = %batch_id,
                        attempt = attempt + 1,
                        "batch update conflict, retrying"
                    );
                    counter!("vidx_batch_conflicts_total").increment(1);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            batch_id = %batch_id,
            job_id = %result.job_id,
            attempts = self.max_attempts,
            "batch update retries exhausted, aggregate may be stale"
        );
        Ok(false)
    }
}
