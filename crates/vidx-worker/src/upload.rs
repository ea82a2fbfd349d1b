//! Upload intake: validation, job creation, and background dispatch.
//!
//! Accepts one file or a batch, validates each upfront, writes the job
//! records, and detaches ingestion onto the runtime. For a batch the
//! parent record is written before any child starts, so the first child
//! to finish always finds it.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{error, info, warn};
use vidx_jobs::{BatchAggregator, JobStore};
use vidx_models::{BatchId, IngestionJob, JobId, JobResult, Namespace};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::orchestrator::IngestionOrchestrator;

/// File extensions accepted for ingestion.
const ALLOWED_EXTENSIONS: [&str; 9] = [
    "mp4", "mpeg", "mpg", "mov", "avi", "mkv", "webm", "flv", "m4v",
];

/// One file received from the caller.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Receipt for a single-file upload.
#[derive(Debug, Clone, Serialize)]
pub struct SingleUploadReceipt {
    pub job_id: JobId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub status: String,
}

/// Receipt for a batch upload.
#[derive(Debug, Clone, Serialize)]
pub struct BatchUploadReceipt {
    pub batch_job_id: BatchId,
    pub status: String,
    pub total_submitted: usize,
    pub failed_validation: usize,
    pub total_videos: usize,
    pub successfully_spawned: usize,
    pub failed_at_upload: usize,
}

/// What the caller gets back once intake is done.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UploadReceipt {
    Single(SingleUploadReceipt),
    Batch(BatchUploadReceipt),
}

/// Validate one upload for safety and compatibility.
///
/// Checks the filename for traversal attempts, the extension against
/// the accepted list, and the payload against the size limits.
pub fn validate_upload(file: &UploadedFile, max_file_size: u64) -> WorkerResult<()> {
    if file.filename.is_empty() {
        return Err(WorkerError::invalid_upload("file has no filename"));
    }
    if file.filename.contains("..")
        || file.filename.contains('/')
        || file.filename.contains('\\')
    {
        return Err(WorkerError::invalid_upload(
            "filename contains invalid characters",
        ));
    }
    match file.filename.rsplit_once('.') {
        Some((_, ext)) if ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {}
        _ => {
            return Err(WorkerError::invalid_upload(format!(
                "unsupported file type, allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )))
        }
    }
    if file.bytes.is_empty() {
        return Err(WorkerError::invalid_upload("file is empty"));
    }
    if file.bytes.len() as u64 > max_file_size {
        return Err(WorkerError::invalid_upload(format!(
            "file too large ({:.1} MB, max {} MB)",
            file.bytes.len() as f64 / 1024.0 / 1024.0,
            max_file_size / 1024 / 1024
        )));
    }
    Ok(())
}

/// Validates uploads, creates job records, and detaches processing.
pub struct UploadHandler {
    orchestrator: Arc<IngestionOrchestrator>,
    aggregator: Arc<BatchAggregator>,
    jobs: Arc<dyn JobStore>,
    max_file_size: u64,
    max_batch_size: usize,
}

impl UploadHandler {
    pub fn new(
        orchestrator: Arc<IngestionOrchestrator>,
        aggregator: Arc<BatchAggregator>,
        jobs: Arc<dyn JobStore>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            orchestrator,
            aggregator,
            jobs,
            max_file_size: config.max_file_size,
            max_batch_size: config.max_batch_size,
        }
    }

    /// Accept an upload, single or batch, and return its receipt.
    ///
    /// Processing continues in the background after this returns; the
    /// receipt carries the ids to poll.
    pub async fn handle_upload(
        &self,
        files: Vec<UploadedFile>,
        namespace: Namespace,
    ) -> WorkerResult<UploadReceipt> {
        if files.is_empty() {
            return Err(WorkerError::invalid_upload("no files provided"));
        }
        if files.len() > self.max_batch_size {
            return Err(WorkerError::invalid_upload(format!(
                "batch size ({}) exceeds maximum ({})",
                files.len(),
                self.max_batch_size
            )));
        }
        if files.len() == 1 {
            let file = files.into_iter().next().unwrap_or_else(|| unreachable!());
            Ok(UploadReceipt::Single(
                self.handle_single(file, namespace).await?,
            ))
        } else {
            Ok(UploadReceipt::Batch(
                self.handle_batch(files, namespace).await?,
            ))
        }
    }

    async fn handle_single(
        &self,
        file: UploadedFile,
        namespace: Namespace,
    ) -> WorkerResult<SingleUploadReceipt> {
        validate_upload(&file, self.max_file_size)?;

        let job_id = JobId::new();
        let job = IngestionJob::new(
            job_id.clone(),
            &file.filename,
            file.bytes.len() as u64,
            &file.content_type,
            namespace.clone(),
            None,
        );
        self.jobs.create_job(&job).await?;

        let receipt = SingleUploadReceipt {
            job_id: job_id.clone(),
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            size_bytes: file.bytes.len() as u64,
            status: "processing".to_string(),
        };
        self.spawn_ingest(file, job_id, namespace, None);
        Ok(receipt)
    }

    async fn handle_batch(
        &self,
        files: Vec<UploadedFile>,
        namespace: Namespace,
    ) -> WorkerResult<BatchUploadReceipt> {
        let total_submitted = files.len();
        let batch_id = BatchId::new();

        let mut validated = Vec::with_capacity(files.len());
        for file in files {
            match validate_upload(&file, self.max_file_size) {
                Ok(()) => validated.push((JobId::new(), file)),
                Err(e) => warn!(
                    batch_id = %batch_id,
                    filename = %file.filename,
                    "skipping invalid file: {e}"
                ),
            }
        }
        if validated.is_empty() {
            return Err(WorkerError::invalid_upload("all files failed validation"));
        }
        let failed_validation = total_submitted - validated.len();

        // The parent record must exist before any child can report.
        let child_ids = validated.iter().map(|(id, _)| id.clone()).collect();
        self.aggregator
            .create_batch(batch_id.clone(), child_ids, namespace.clone())
            .await?;

        let total_videos = validated.len();
        let mut spawned = 0usize;
        for (job_id, file) in validated {
            let job = IngestionJob::new(
                job_id.clone(),
                &file.filename,
                file.bytes.len() as u64,
                &file.content_type,
                namespace.clone(),
                Some(batch_id.clone()),
            );
            match self.jobs.create_job(&job).await {
                Ok(()) => {
                    self.spawn_ingest(file, job_id, namespace.clone(), Some(batch_id.clone()));
                    spawned += 1;
                }
                Err(e) => {
                    error!(
                        batch_id = %batch_id,
                        job_id = %job_id,
                        filename = %file.filename,
                        "failed to create child job: {e}"
                    );
                    self.report_upload_failure(&batch_id, job_id, &file.filename, &e.to_string())
                        .await;
                }
            }
        }

        if spawned == 0 {
            return Err(WorkerError::upload_failed("all videos failed to process"));
        }
        info!(
            batch_id = %batch_id,
            spawned,
            total = total_videos,
            "batch upload dispatched"
        );

        Ok(BatchUploadReceipt {
            batch_job_id: batch_id,
            status: "processing".to_string(),
            total_submitted,
            failed_validation,
            total_videos,
            successfully_spawned: spawned,
            failed_at_upload: total_videos - spawned,
        })
    }

    /// A child that died before processing still counts against its batch.
    async fn report_upload_failure(
        &self,
        batch_id: &BatchId,
        job_id: JobId,
        filename: &str,
        error_msg: &str,
    ) {
        if let Err(e) = self
            .jobs
            .set_failed(&job_id, &format!("Upload failed: {error_msg}"))
            .await
        {
            warn!(job_id = %job_id, "could not persist upload failure: {e}");
        }
        let result = JobResult::failed(job_id.clone(), filename, format!("Upload failed: {error_msg}"));
        match self.aggregator.on_child_done(batch_id, &result).await {
            Ok(true) => {}
            Ok(false) => error!(
                batch_id = %batch_id,
                job_id = %job_id,
                "CRITICAL: batch record not updated after max retries, batch state may be inconsistent"
            ),
            Err(e) => error!(
                batch_id = %batch_id,
                job_id = %job_id,
                error = %e,
                "failed to update batch record"
            ),
        }
    }

    /// Detach one ingestion onto the runtime. The orchestrator persists
    /// the outcome, so the task's result is intentionally dropped.
    fn spawn_ingest(
        &self,
        file: UploadedFile,
        job_id: JobId,
        namespace: Namespace,
        parent_batch_id: Option<BatchId>,
    ) {
        counter!("vidx_jobs_enqueued_total").increment(1);
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator
                .ingest(file.bytes, &file.filename, job_id, namespace, parent_batch_id)
                .await;
        });
    }
}
