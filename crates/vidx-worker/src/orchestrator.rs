//! Per-video ingestion orchestration.
//!
//! Sequences upload, pipeline, and per-chunk embed/index for one video,
//! persists the terminal job status, and rolls back partial writes when
//! a stage fails. The blob store and vector index are independent
//! systems, so compensation attempts each one even when the other fails.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use tracing::{debug, error, info};
use vidx_embed::Embedder;
use vidx_index::VectorIndex;
use vidx_jobs::{BatchAggregator, JobStore};
use vidx_media::{collect_stats, ChunkResult, MediaResult, PipelineCoordinator};
use vidx_models::{BatchId, ChunkDetail, JobId, JobResult, Namespace, VideoId};
use vidx_storage::BlobStore;

use crate::cache::ResultCache;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Pipeline seam the orchestrator drives.
///
/// Implemented by the real coordinator; tests substitute canned results.
#[async_trait]
pub trait VideoPipeline: Send + Sync {
    async fn process(
        &self,
        video_bytes: &[u8],
        video_id: &VideoId,
        filename: &str,
        hashed_identifier: Option<&str>,
    ) -> MediaResult<Vec<ChunkResult>>;
}

#[async_trait]
impl VideoPipeline for PipelineCoordinator {
    async fn process(
        &self,
        video_bytes: &[u8],
        video_id: &VideoId,
        filename: &str,
        hashed_identifier: Option<&str>,
    ) -> MediaResult<Vec<ChunkResult>> {
        PipelineCoordinator::process(self, video_bytes, video_id, filename, hashed_identifier)
            .await
    }
}

/// Writes that must be undone if a later stage fails.
#[derive(Debug, Default)]
struct RollbackState {
    hashed_identifier: Option<String>,
    upserted_chunk_ids: Vec<String>,
}

/// Drives one video from raw bytes to indexed vectors.
pub struct IngestionOrchestrator {
    pipeline: Arc<dyn VideoPipeline>,
    blobs: Arc<dyn BlobStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    jobs: Arc<dyn JobStore>,
    cache: Arc<dyn ResultCache>,
    aggregator: Arc<BatchAggregator>,
}

impl IngestionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: Arc<dyn VideoPipeline>,
        blobs: Arc<dyn BlobStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        jobs: Arc<dyn JobStore>,
        cache: Arc<dyn ResultCache>,
        aggregator: Arc<BatchAggregator>,
    ) -> Self {
        Self {
            pipeline,
            blobs,
            embedder,
            index,
            jobs,
            cache,
            aggregator,
        }
    }

    /// Ingest one video end to end and return its terminal result.
    ///
    /// The result is also persisted to the job store and, when the job
    /// belongs to a batch, folded into the parent record. Never returns
    /// an error: every failure becomes a failed `JobResult`.
    pub async fn ingest(
        &self,
        video_bytes: Vec<u8>,
        filename: &str,
        job_id: JobId,
        namespace: Namespace,
        parent_batch_id: Option<BatchId>,
    ) -> JobResult {
        let log = JobLogger::new(&job_id, "video_ingestion");
        log.log_start(&format!(
            "{} ({} bytes), namespace '{}'",
            filename,
            video_bytes.len(),
            namespace.cache_key()
        ));

        let mut rollback = RollbackState::default();
        let result = match self
            .run(&video_bytes, filename, &job_id, &namespace, &log, &mut rollback)
            .await
        {
            Ok((identifier, results)) => {
                let stats = collect_stats(&results);
                let details = results.iter().map(chunk_detail).collect();
                let result =
                    JobResult::completed(job_id.clone(), filename, identifier, &stats, details);
                if let Err(e) = self.jobs.set_completed(&job_id, result.clone()).await {
                    log.log_error(&format!("failed to persist completed status: {e}"));
                }
                self.cache.invalidate(&namespace).await;
                counter!("vidx_jobs_completed_total").increment(1);
                log.log_completion(&format!(
                    "{} chunks, {} frames, {:.1} MB sampled",
                    stats.chunks, stats.total_frames, stats.total_memory_mb
                ));
                result
            }
            Err(e) => {
                log.log_error(&format!("{} stage failed: {e}", e.stage()));
                self.compensate(&rollback, &namespace).await;
                if let Err(pe) = self.jobs.set_failed(&job_id, &e.to_string()).await {
                    log.log_error(&format!("failed to persist failed status: {pe}"));
                }
                counter!("vidx_jobs_failed_total", "stage" => e.stage()).increment(1);
                JobResult::failed(job_id.clone(), filename, e.to_string())
            }
        };

        if let Some(batch_id) = parent_batch_id {
            self.report_to_batch(&batch_id, &result).await;
        }
        result
    }

    /// The fallible stages. Anything recorded in `rollback` existed
    /// before the returned error and must be compensated by the caller.
    async fn run(
        &self,
        video_bytes: &[u8],
        filename: &str,
        job_id: &JobId,
        namespace: &Namespace,
        log: &JobLogger,
        rollback: &mut RollbackState,
    ) -> WorkerResult<(String, Vec<ChunkResult>)> {
        // Stage 1: store the original upload. The stored name carries a
        // timestamp so repeated uploads of the same file never collide.
        let stored_name = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S"), filename);
        let upload_started = Instant::now();
        let identifier = self
            .blobs
            .put(namespace, &stored_name, video_bytes.to_vec())
            .await
            .map_err(|e| WorkerError::upload_failed(e.to_string()))?;
        histogram!("vidx_stage_duration_seconds", "stage" => "upload")
            .record(upload_started.elapsed().as_secs_f64());
        rollback.hashed_identifier = Some(identifier.clone());
        log.log_progress(&format!("uploaded source as {identifier}"));

        // Stage 2: segment, sample, and compress.
        let video_id = VideoId::from(job_id.as_str());
        let pipeline_started = Instant::now();
        let results = self
            .pipeline
            .process(video_bytes, &video_id, filename, Some(&identifier))
            .await
            .map_err(|e| WorkerError::pipeline_failed(e.to_string()))?;
        histogram!("vidx_stage_duration_seconds", "stage" => "pipeline")
            .record(pipeline_started.elapsed().as_secs_f64());
        // Zero chunks (e.g. a source too short to chunk) is a valid
        // empty ingest: the job completes and the blob stays.
        log.log_progress(&format!("pipeline produced {} chunks", results.len()));

        // Stage 3: embed and index chunk by chunk. A chunk id enters the
        // rollback list only after its upsert is confirmed.
        for chunk in &results {
            let embed_started = Instant::now();
            let vector = self
                .embedder
                .embed(&chunk.frames)
                .await
                .map_err(|e| WorkerError::embed_failed(&chunk.chunk_id, e))?;
            histogram!("vidx_stage_duration_seconds", "stage" => "embed")
                .record(embed_started.elapsed().as_secs_f64());
            let payload = chunk.metadata.flatten();
            let upsert_started = Instant::now();
            self.index
                .upsert(&chunk.chunk_id, &vector, namespace, payload)
                .await
                .map_err(|e| WorkerError::index_failed(&chunk.chunk_id, e))?;
            histogram!("vidx_stage_duration_seconds", "stage" => "upsert")
                .record(upsert_started.elapsed().as_secs_f64());
            rollback.upserted_chunk_ids.push(chunk.chunk_id.clone());
            debug!(
                job_id = %job_id,
                chunk_id = %chunk.chunk_id,
                frames = chunk.metadata.frame_count,
                "chunk indexed"
            );
        }

        Ok((identifier, results))
    }

    /// Undo partial writes after a failure.
    ///
    /// Each target is attempted regardless of the other's outcome.
    /// Failures are logged at high severity but never returned; failing
    /// to undo a write must not prevent reporting the original failure.
    async fn compensate(&self, rollback: &RollbackState, namespace: &Namespace) {
        if let Some(identifier) = &rollback.hashed_identifier {
            info!(identifier = %identifier, "rolling back uploaded source");
            if !self.blobs.delete(identifier).await {
                error!(identifier = %identifier, "compensation could not delete uploaded source");
                counter!("vidx_compensation_failures_total", "target" => "blob").increment(1);
            }
        }
        if !rollback.upserted_chunk_ids.is_empty() {
            info!(
                chunks = rollback.upserted_chunk_ids.len(),
                "rolling back upserted vectors"
            );
            if let Err(e) = self
                .index
                .delete_many(&rollback.upserted_chunk_ids, namespace)
                .await
            {
                error!(error = %e, "compensation could not delete upserted vectors");
                counter!("vidx_compensation_failures_total", "target" => "index").increment(1);
            }
        }
    }

    /// Fold a terminal child result into its parent batch record.
    async fn report_to_batch(&self, batch_id: &BatchId, result: &JobResult) {
        match self.aggregator.on_child_done(batch_id, result).await {
            Ok(true) => {}
            Ok(false) => error!(
                batch_id = %batch_id,
                job_id = %result.job_id,
                "CRITICAL: batch record not updated after max retries, batch state may be inconsistent"
            ),
            Err(e) => error!(
                batch_id = %batch_id,
                job_id = %result.job_id,
                error = %e,
                "failed to update batch record"
            ),
        }
    }
}

fn chunk_detail(result: &ChunkResult) -> ChunkDetail {
    ChunkDetail {
        chunk_id: result.chunk_id.clone(),
        start_time: result.metadata.timestamp_range.start,
        end_time: result.metadata.timestamp_range.end,
        frame_count: result.metadata.frame_count,
        complexity_score: result.metadata.complexity_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidx_jobs::MemoryJobStore;
    use vidx_media::PipelineConfig;
    use vidx_models::{BatchStatus, IngestionJob, JobStatus};

    use crate::testutil::{
        FakePipeline, RecordingBlobStore, RecordingCache, RecordingIndex, StubEmbedder,
    };

    struct Harness {
        blobs: Arc<RecordingBlobStore>,
        embedder: Arc<StubEmbedder>,
        index: Arc<RecordingIndex>,
        jobs: Arc<MemoryJobStore>,
        cache: Arc<RecordingCache>,
        orchestrator: IngestionOrchestrator,
    }

    fn harness(
        pipeline: Arc<dyn VideoPipeline>,
        blobs: RecordingBlobStore,
        embedder: StubEmbedder,
        index: RecordingIndex,
    ) -> Harness {
        let blobs = Arc::new(blobs);
        let embedder = Arc::new(embedder);
        let index = Arc::new(index);
        let jobs = Arc::new(MemoryJobStore::new());
        let cache = Arc::new(RecordingCache::default());
        let store: Arc<dyn JobStore> = jobs.clone();
        let aggregator = Arc::new(BatchAggregator::new(Arc::clone(&store)));
        let orchestrator = IngestionOrchestrator::new(
            pipeline,
            blobs.clone(),
            embedder.clone(),
            index.clone(),
            store,
            cache.clone(),
            aggregator,
        );
        Harness {
            blobs,
            embedder,
            index,
            jobs,
            cache,
            orchestrator,
        }
    }

    async fn seeded_job(jobs: &MemoryJobStore, job_id: &JobId, batch: Option<BatchId>) {
        let job = IngestionJob::new(
            job_id.clone(),
            "clip.mp4",
            1024,
            "video/mp4",
            Namespace::from("ns"),
            batch,
        );
        jobs.create_job(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_ingest_completes_job() {
        let h = harness(
            Arc::new(FakePipeline::with_chunks(2)),
            RecordingBlobStore::default(),
            StubEmbedder::default(),
            RecordingIndex::default(),
        );
        let job_id = JobId::from("vid-1");
        seeded_job(&h.jobs, &job_id, None).await;

        let result = h
            .orchestrator
            .ingest(
                vec![1, 2, 3],
                "clip.mp4",
                job_id.clone(),
                Namespace::from("ns"),
                None,
            )
            .await;

        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.chunks, 2);
        assert!(result.total_frames > 0);
        let identifier = result.hashed_identifier.as_deref().unwrap();
        assert!(identifier.starts_with("ns/"));
        assert!(identifier.ends_with("_clip.mp4"));

        assert_eq!(
            *h.index.upserts.lock().unwrap(),
            vec!["vid-1_chunk_0000", "vid-1_chunk_0001"]
        );
        assert!(h.blobs.deletes.lock().unwrap().is_empty());
        assert!(h.index.delete_calls.lock().unwrap().is_empty());
        assert_eq!(*h.cache.invalidations.lock().unwrap(), vec!["ns"]);

        let job = h.jobs.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap().chunk_details.len(), 2);
    }

    #[tokio::test]
    async fn test_upload_failure_is_terminal_without_compensation() {
        let h = harness(
            Arc::new(FakePipeline::with_chunks(2)),
            RecordingBlobStore::failing_put(),
            StubEmbedder::default(),
            RecordingIndex::default(),
        );
        let job_id = JobId::from("vid-1");
        seeded_job(&h.jobs, &job_id, None).await;

        let result = h
            .orchestrator
            .ingest(
                vec![1, 2, 3],
                "clip.mp4",
                job_id.clone(),
                Namespace::from("ns"),
                None,
            )
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("Upload failed"));
        assert!(h.blobs.deletes.lock().unwrap().is_empty());
        assert!(h.index.delete_calls.lock().unwrap().is_empty());
        assert!(h.cache.invalidations.lock().unwrap().is_empty());

        let job = h.jobs.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_zero_chunks_completes_without_indexing() {
        let h = harness(
            Arc::new(FakePipeline::with_chunks(0)),
            RecordingBlobStore::default(),
            StubEmbedder::default(),
            RecordingIndex::default(),
        );
        let job_id = JobId::from("vid-1");
        seeded_job(&h.jobs, &job_id, None).await;

        let result = h
            .orchestrator
            .ingest(
                vec![1, 2, 3],
                "clip.mp4",
                job_id.clone(),
                Namespace::from("ns"),
                None,
            )
            .await;

        // A source too short to chunk is a valid, empty ingest.
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.chunks, 0);
        assert_eq!(result.total_frames, 0);
        assert!(result.hashed_identifier.is_some());

        // The embed/index loop never ran and the blob was kept.
        assert_eq!(h.embedder.call_count(), 0);
        assert!(h.index.upserts.lock().unwrap().is_empty());
        assert!(h.index.delete_calls.lock().unwrap().is_empty());
        assert!(h.blobs.deletes.lock().unwrap().is_empty());

        let job = h.jobs.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn test_second_upsert_failure_rolls_back_only_the_first() {
        let h = harness(
            Arc::new(FakePipeline::with_chunks(2)),
            RecordingBlobStore::default(),
            StubEmbedder::default(),
            RecordingIndex::failing_on_upsert(2),
        );
        let job_id = JobId::from("vid-1");
        seeded_job(&h.jobs, &job_id, None).await;

        let result = h
            .orchestrator
            .ingest(
                vec![1, 2, 3],
                "clip.mp4",
                job_id.clone(),
                Namespace::from("ns"),
                None,
            )
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("vid-1_chunk_0001"));

        // Only the first chunk made it in, so only it is deleted.
        assert_eq!(*h.index.upserts.lock().unwrap(), vec!["vid-1_chunk_0000"]);
        let delete_calls = h.index.delete_calls.lock().unwrap();
        assert_eq!(delete_calls.len(), 1);
        assert_eq!(delete_calls[0], vec!["vid-1_chunk_0000".to_string()]);
        assert!(!delete_calls[0].contains(&"vid-1_chunk_0001".to_string()));
        assert_eq!(h.blobs.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vector_rollback_runs_even_when_blob_delete_fails() {
        let h = harness(
            Arc::new(FakePipeline::with_chunks(2)),
            RecordingBlobStore::failing_delete(),
            StubEmbedder::default(),
            RecordingIndex::failing_on_upsert(2),
        );
        let job_id = JobId::from("vid-1");
        seeded_job(&h.jobs, &job_id, None).await;

        let result = h
            .orchestrator
            .ingest(
                vec![1, 2, 3],
                "clip.mp4",
                job_id.clone(),
                Namespace::from("ns"),
                None,
            )
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        // Blob delete was attempted and failed; vector delete still ran.
        assert_eq!(h.blobs.deletes.lock().unwrap().len(), 1);
        let delete_calls = h.index.delete_calls.lock().unwrap();
        assert_eq!(delete_calls.len(), 1);
        assert_eq!(delete_calls[0], vec!["vid-1_chunk_0000".to_string()]);
    }

    #[tokio::test]
    async fn test_embed_failure_compensates_blob_only() {
        let h = harness(
            Arc::new(FakePipeline::with_chunks(2)),
            RecordingBlobStore::default(),
            StubEmbedder::failing_on(1),
            RecordingIndex::default(),
        );
        let job_id = JobId::from("vid-1");
        seeded_job(&h.jobs, &job_id, None).await;

        let result = h
            .orchestrator
            .ingest(
                vec![1, 2, 3],
                "clip.mp4",
                job_id.clone(),
                Namespace::from("ns"),
                None,
            )
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("Embedding failed"));
        assert!(h.index.upserts.lock().unwrap().is_empty());
        // Nothing was upserted, so the vector index is never touched.
        assert!(h.index.delete_calls.lock().unwrap().is_empty());
        assert_eq!(h.blobs.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_result_reaches_parent_batch() {
        let h = harness(
            Arc::new(FakePipeline::with_chunks(1)),
            RecordingBlobStore::failing_put(),
            StubEmbedder::default(),
            RecordingIndex::default(),
        );
        let job_id = JobId::from("vid-1");
        let batch_id = BatchId::from("batch-1");
        seeded_job(&h.jobs, &job_id, Some(batch_id.clone())).await;
        let store: Arc<dyn JobStore> = h.jobs.clone();
        BatchAggregator::new(store)
            .create_batch(batch_id.clone(), vec![job_id.clone()], Namespace::from("ns"))
            .await
            .unwrap();

        let result = h
            .orchestrator
            .ingest(
                vec![1, 2, 3],
                "clip.mp4",
                job_id.clone(),
                Namespace::from("ns"),
                Some(batch_id.clone()),
            )
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        let batch = h.jobs.get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(batch.failed_count, 1);
        assert_eq!(batch.failed_jobs.len(), 1);
        assert_eq!(batch.failed_jobs[0].job_id, job_id);
    }

    /// End-to-end run over a real encoded video, using the real pipeline
    /// and in-memory collaborators. Requires ffmpeg and ffprobe.
    #[tokio::test]
    async fn test_short_video_ingests_end_to_end() {
        if which::which("ffmpeg").is_err() || which::which("ffprobe").is_err() {
            eprintln!("ffmpeg/ffprobe not found, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let status = std::process::Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=5:size=320x240:rate=30",
                "-c:v",
                "mpeg4",
                "-qscale:v",
                "5",
            ])
            .arg(&path)
            .status()
            .unwrap();
        assert!(status.success());
        let bytes = std::fs::read(&path).unwrap();

        let pipeline = PipelineCoordinator::new(PipelineConfig {
            min_chunk_duration: 1.0,
            max_chunk_duration: 10.0,
            ..PipelineConfig::default()
        });
        let h = harness(
            Arc::new(pipeline),
            RecordingBlobStore::default(),
            StubEmbedder::default(),
            RecordingIndex::default(),
        );
        let job_id = JobId::from("vid-e2e");
        seeded_job(&h.jobs, &job_id, None).await;

        let result = h
            .orchestrator
            .ingest(bytes, "clip.mp4", job_id.clone(), Namespace::from("ns"), None)
            .await;

        assert_eq!(result.status, JobStatus::Completed, "error: {:?}", result.error);
        assert!(result.chunks >= 1);
        assert!(result.total_frames > 0);
        assert_eq!(
            h.index.upserts.lock().unwrap().len(),
            result.chunks,
            "every chunk should be indexed exactly once"
        );
        let job = h.jobs.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
