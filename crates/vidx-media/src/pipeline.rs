//! Per-video processing pipeline.
//!
//! Writes the upload to a transient file, probes it once, segments it into
//! chunks and fans the chunks out across a bounded worker pool. Each worker
//! samples and compresses independently with its own decode handle. Chunks
//! that yield nothing are dropped and logged rather than failing the video.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vidx_models::{Chunk, ChunkMetadata, FileInfo, PipelineStats, TimestampRange, VideoId};

use crate::chunker::Chunker;
use crate::compressor::Compressor;
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::probe::{ProbeCache, VideoInfo};
use crate::sampler::{FrameSampler, SampledFrames};

/// Tunables for the per-video pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub min_chunk_duration: f64,
    pub max_chunk_duration: f64,
    pub scene_threshold: f64,
    pub min_sampling_fps: f64,
    pub max_sampling_fps: f64,
    pub motion_threshold: f64,
    pub target_width: u32,
    pub target_height: u32,
    pub max_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_chunk_duration: 5.0,
            max_chunk_duration: 20.0,
            scene_threshold: 13.0,
            min_sampling_fps: 0.5,
            max_sampling_fps: 2.0,
            motion_threshold: 25.0,
            target_width: 640,
            target_height: 480,
            max_workers: 4,
        }
    }
}

/// Output of processing one chunk: compressed frames plus metadata.
#[derive(Debug)]
pub struct ChunkResult {
    pub chunk_id: String,
    pub frames: Vec<Frame>,
    pub metadata: ChunkMetadata,
    /// Decoded size of the retained frames in megabytes.
    pub memory_mb: f64,
}

/// Runs the chunk/sample/compress pipeline for one video.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    chunker: Chunker,
    sampler: FrameSampler,
    compressor: Compressor,
    probe_cache: ProbeCache,
}

impl PipelineCoordinator {
    pub fn new(config: PipelineConfig) -> Self {
        let chunker = Chunker::new(
            config.min_chunk_duration,
            config.max_chunk_duration,
            config.scene_threshold,
        );
        let sampler = FrameSampler::new(
            config.min_sampling_fps,
            config.max_sampling_fps,
            config.motion_threshold,
        );
        let compressor = Compressor::new(config.target_width, config.target_height);
        Self {
            config,
            chunker,
            sampler,
            compressor,
            probe_cache: ProbeCache::new(),
        }
    }

    /// Process a whole video into chunk results.
    ///
    /// Failed chunks are dropped with a warning. An unreadable source
    /// produces no chunks and therefore an empty list, not an error;
    /// the caller decides whether zero chunks fails the job.
    pub async fn process(
        &self,
        video_bytes: &[u8],
        video_id: &VideoId,
        filename: &str,
        hashed_identifier: Option<&str>,
    ) -> MediaResult<Vec<ChunkResult>> {
        let workdir = tempfile::tempdir()?;
        let extension = vidx_models::metadata::file_type_of(filename);
        let source_path = workdir.path().join(format!("source.{extension}"));
        tokio::fs::write(&source_path, video_bytes).await?;

        let source_info = match self.probe_cache.info(&source_path).await {
            Ok(info) => info,
            Err(e) => {
                warn!(video_id = %video_id, error = %e, "source unreadable, no chunks produced");
                return Ok(Vec::new());
            }
        };
        debug!(
            video_id = %video_id,
            duration = source_info.duration,
            fps = source_info.fps,
            width = source_info.width,
            height = source_info.height,
            "probed source"
        );

        let chunks = self.chunker.segment(&source_path, video_id, &source_info).await;
        if chunks.is_empty() {
            warn!(video_id = %video_id, "no chunks produced");
            return Ok(Vec::new());
        }

        let pool_size = self.pool_size(chunks.len());
        info!(
            video_id = %video_id,
            chunks = chunks.len(),
            workers = pool_size,
            "processing chunks"
        );

        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let semaphore = Arc::clone(&semaphore);
            let sampler = self.sampler.clone();
            let compressor = self.compressor.clone();
            let path = source_path.clone();
            let info = source_info.clone();
            let video_id = video_id.clone();
            let filename = filename.to_string();
            let hashed_identifier = hashed_identifier.map(str::to_string);

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return None,
                };
                process_chunk(
                    sampler,
                    compressor,
                    path,
                    chunk,
                    info,
                    video_id,
                    filename,
                    hashed_identifier,
                )
                .await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for outcome in futures::future::join_all(handles).await {
            match outcome {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => {
                    warn!(video_id = %video_id, error = %err, "chunk worker panicked, dropping chunk");
                    counter!("vidx_chunks_dropped_total").increment(1);
                }
            }
        }

        info!(
            video_id = %video_id,
            succeeded = results.len(),
            "pipeline finished"
        );
        Ok(results)
    }

    /// Worker pool size for a chunk count.
    fn pool_size(&self, chunk_count: usize) -> usize {
        self.config.max_workers.min(chunk_count).max(1)
    }
}

/// Sample and compress one chunk. Returns `None` when the chunk yields
/// no frames, dropping it from the video.
#[allow(clippy::too_many_arguments)]
async fn process_chunk(
    sampler: FrameSampler,
    compressor: Compressor,
    path: PathBuf,
    chunk: Chunk,
    info: VideoInfo,
    video_id: VideoId,
    filename: String,
    hashed_identifier: Option<String>,
) -> Option<ChunkResult> {
    let sampled: SampledFrames = sampler.extract(&path, &chunk, &info).await;
    if sampled.is_empty() {
        warn!(chunk_id = %chunk.chunk_id, "no frames sampled, dropping chunk");
        counter!("vidx_chunks_dropped_total").increment(1);
        return None;
    }

    let effective_fps = sampled.effective_fps;
    let complexity_score = sampled.complexity_score;
    let frames = compressor.compress(sampled.frames);
    let memory_mb: f64 = frames.iter().map(Frame::memory_mb).sum();

    let metadata = ChunkMetadata {
        chunk_id: chunk.chunk_id.clone(),
        video_id,
        timestamp_range: TimestampRange {
            start: chunk.start_time,
            end: chunk.end_time,
        },
        duration: chunk.duration(),
        frame_count: frames.len() as u32,
        sampling_fps: effective_fps,
        complexity_score,
        file_info: FileInfo::for_upload(filename, hashed_identifier),
        processed_at: Utc::now(),
    };

    debug!(
        chunk_id = %chunk.chunk_id,
        frames = frames.len(),
        effective_fps = format!("{effective_fps:.2}"),
        complexity = format!("{complexity_score:.2}"),
        "chunk processed"
    );
    counter!("vidx_chunks_processed_total").increment(1);

    Some(ChunkResult {
        chunk_id: chunk.chunk_id,
        frames,
        metadata,
        memory_mb,
    })
}

/// Aggregate statistics over a video's chunk results.
pub fn collect_stats(results: &[ChunkResult]) -> PipelineStats {
    let mut stats = PipelineStats::default();
    for result in results {
        stats.add_chunk(
            result.metadata.frame_count,
            result.memory_mb,
            result.metadata.complexity_score,
        );
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(frame_count: u32, memory_mb: f64, complexity: f64) -> ChunkResult {
        let video_id = VideoId::from("vid");
        let chunk = Chunk::new(&video_id, 0, 0.0, 10.0);
        ChunkResult {
            chunk_id: chunk.chunk_id.clone(),
            frames: Vec::new(),
            metadata: ChunkMetadata {
                chunk_id: chunk.chunk_id,
                video_id,
                timestamp_range: TimestampRange {
                    start: 0.0,
                    end: 10.0,
                },
                duration: 10.0,
                frame_count,
                sampling_fps: 1.0,
                complexity_score: complexity,
                file_info: FileInfo::for_upload("clip.mp4", None),
                processed_at: Utc::now(),
            },
            memory_mb,
        }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_chunk_duration, 5.0);
        assert_eq!(config.max_chunk_duration, 20.0);
        assert_eq!(config.max_workers, 4);
        assert_eq!((config.target_width, config.target_height), (640, 480));
    }

    #[test]
    fn test_pool_size_bounded_by_chunks_and_workers() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        assert_eq!(coordinator.pool_size(10), 4);
        assert_eq!(coordinator.pool_size(2), 2);
        assert_eq!(coordinator.pool_size(1), 1);
    }

    #[test]
    fn test_collect_stats_folds_results() {
        let results = vec![
            result_with(10, 1.5, 0.4),
            result_with(20, 2.5, 0.8),
        ];

        let stats = collect_stats(&results);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.total_frames, 30);
        assert!((stats.total_memory_mb - 4.0).abs() < 1e-9);
        assert!((stats.avg_complexity - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_collect_stats_empty() {
        let stats = collect_stats(&[]);
        assert!(stats.is_empty());
        assert_eq!(stats.avg_complexity, 0.0);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_yield_zero_results() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        let results = coordinator
            .process(b"not a video", &VideoId::from("vid"), "clip.mp4", None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    /// Full pipeline pass over a real encoded video. Requires ffmpeg
    /// and ffprobe.
    #[tokio::test]
    async fn test_real_video_chunks_are_contiguous_and_sampled_in_bounds() {
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
                "testsrc=duration=8:size=320x240:rate=30",
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

        let config = PipelineConfig {
            min_chunk_duration: 1.0,
            max_chunk_duration: 4.0,
            target_width: 160,
            target_height: 120,
            ..PipelineConfig::default()
        };
        let coordinator = PipelineCoordinator::new(config.clone());
        let mut results = coordinator
            .process(&bytes, &VideoId::from("vid-pipe"), "clip.mp4", None)
            .await
            .unwrap();
        assert!(!results.is_empty());

        // Completion order is unspecified; chunk ids restore time order.
        results.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        for (i, result) in results.iter().enumerate() {
            let range = &result.metadata.timestamp_range;
            let duration = range.end - range.start;
            assert!(duration > 0.0);
            if i + 1 < results.len() {
                assert!(duration <= config.max_chunk_duration + 0.1);
                let next = &results[i + 1].metadata.timestamp_range;
                assert!((next.start - range.end).abs() < 0.1, "gap between chunks");
            }

            assert!(result.metadata.frame_count > 0);
            assert!((0.0..=1.0).contains(&result.metadata.complexity_score));
            // The mandatory first frame skews the rate on a short tail
            // chunk, so only full-length chunks are held to the bounds.
            if duration >= config.min_chunk_duration {
                assert!(result.metadata.sampling_fps >= config.min_sampling_fps * 0.8);
                assert!(result.metadata.sampling_fps <= config.max_sampling_fps * 1.2);
            }
            for frame in &result.frames {
                assert_eq!(
                    (frame.width, frame.height),
                    (config.target_width, config.target_height)
                );
            }
        }
    }
}
