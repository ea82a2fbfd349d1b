//! Video ingestion worker binary.
//!
//! Reads video files from the command line, runs them through the
//! ingestion pipeline against the configured stores, and exits once
//! every job has reached a terminal status.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidx_embed::HttpEmbedder;
use vidx_index::PineconeIndex;
use vidx_jobs::{BatchAggregator, JobStore, MemoryJobStore};
use vidx_media::PipelineCoordinator;
use vidx_models::{BatchId, JobId, Namespace};
use vidx_worker::orchestrator::VideoPipeline;
use vidx_worker::{
    IngestionOrchestrator, NoopResultCache, UploadHandler, UploadReceipt, UploadedFile,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting vidx-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: vidx-worker <video file>...");
    }

    let namespace = std::env::var("VIDX_NAMESPACE")
        .map(Namespace::from)
        .unwrap_or_default();

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
        let filename = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("{path} has no usable filename"))?;
        let content_type = content_type_for(&filename);
        files.push(UploadedFile {
            filename,
            content_type: content_type.to_string(),
            bytes,
        });
    }

    let jobs = Arc::new(MemoryJobStore::new());
    let store: Arc<dyn JobStore> = jobs.clone();
    let aggregator = Arc::new(BatchAggregator::new(Arc::clone(&store)));

    let pipeline: Arc<dyn VideoPipeline> =
        Arc::new(PipelineCoordinator::new(config.pipeline_config()));
    let blobs = Arc::new(
        vidx_storage::R2BlobStore::from_env().context("failed to create blob store client")?,
    );
    let embedder =
        Arc::new(HttpEmbedder::from_env().context("failed to create embedding client")?);
    let index =
        Arc::new(PineconeIndex::from_env().context("failed to create vector index client")?);

    let orchestrator = Arc::new(IngestionOrchestrator::new(
        pipeline,
        blobs,
        embedder,
        index,
        Arc::clone(&store),
        Arc::new(NoopResultCache),
        Arc::clone(&aggregator),
    ));
    let handler = UploadHandler::new(orchestrator, aggregator, Arc::clone(&store), &config);

    let receipt = handler
        .handle_upload(files, namespace)
        .await
        .context("upload rejected")?;

    let ok = match receipt {
        UploadReceipt::Single(r) => {
            info!(job_id = %r.job_id, filename = %r.filename, "ingestion dispatched");
            wait_for_job(&*store, &r.job_id).await
        }
        UploadReceipt::Batch(r) => {
            info!(
                batch_id = %r.batch_job_id,
                videos = r.total_videos,
                skipped = r.failed_validation,
                "batch ingestion dispatched"
            );
            wait_for_batch(&*store, &r.batch_job_id).await
        }
    };

    info!("Worker run complete");
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    // JSON output for production, colored output for dev
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("vidx=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mpeg" | "mpg" => "video/mpeg",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "flv" => "video/x-flv",
        _ => "application/octet-stream",
    }
}

/// Poll until the job is terminal. Returns whether it completed.
async fn wait_for_job(store: &dyn JobStore, job_id: &JobId) -> bool {
    loop {
        match store.get_job(job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                if let Some(err) = &job.error {
                    error!(job_id = %job_id, error = %err, "ingestion failed");
                } else if let Some(result) = &job.result {
                    info!(
                        job_id = %job_id,
                        chunks = result.chunks,
                        frames = result.total_frames,
                        "ingestion completed"
                    );
                }
                return job.status == vidx_models::JobStatus::Completed;
            }
            Ok(_) => {}
            Err(e) => {
                error!(job_id = %job_id, error = %e, "job store read failed");
                return false;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Poll until the batch is terminal. Returns whether every child completed.
async fn wait_for_batch(store: &dyn JobStore, batch_id: &BatchId) -> bool {
    loop {
        match store.get_batch(batch_id).await {
            Ok(Some(batch)) if batch.status.is_terminal() => {
                info!(
                    batch_id = %batch_id,
                    status = %batch.status,
                    completed = batch.completed_count,
                    failed = batch.failed_count,
                    "batch finished"
                );
                for failed in &batch.failed_jobs {
                    error!(
                        batch_id = %batch_id,
                        job_id = %failed.job_id,
                        error = %failed.error,
                        "child job failed"
                    );
                }
                return batch.status == vidx_models::BatchStatus::Completed;
            }
            Ok(_) => {}
            Err(e) => {
                error!(batch_id = %batch_id, error = %e, "job store read failed");
                return false;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
