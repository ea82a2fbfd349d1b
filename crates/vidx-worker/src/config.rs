//! Worker configuration.

use std::net::SocketAddr;

use vidx_media::PipelineConfig;

/// Worker configuration.
///
/// Pipeline knobs feed straight into [`PipelineConfig`]; the upload
/// limits bound what intake will accept.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Shortest chunk the segmenter will emit, in seconds
    pub min_chunk_duration: f64,
    /// Longest chunk before an even split, in seconds
    pub max_chunk_duration: f64,
    /// Scene cut sensitivity
    pub scene_threshold: f64,
    /// Sampling floor for static content, frames per second
    pub min_sampling_fps: f64,
    /// Sampling ceiling for high-motion content, frames per second
    pub max_sampling_fps: f64,
    /// Mean frame difference above which content counts as moving
    pub motion_threshold: f64,
    /// Stored frame width after compression
    pub target_width: u32,
    /// Stored frame height after compression
    pub target_height: u32,
    /// Upper bound on concurrent chunk workers per video
    pub max_workers: usize,
    /// Largest accepted upload in bytes
    pub max_file_size: u64,
    /// Most files accepted in one batch
    pub max_batch_size: usize,
    /// Prometheus scrape address, when metrics are enabled
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_duration: 1.0,
            max_chunk_duration: 10.0,
            scene_threshold: 13.0,
            min_sampling_fps: 0.5,
            max_sampling_fps: 2.0,
            motion_threshold: 25.0,
            target_width: 640,
            target_height: 480,
            max_workers: 4,
            max_file_size: 2 * 1024 * 1024 * 1024, // 2 GB
            max_batch_size: 200,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_chunk_duration: std::env::var("CHUNK_MIN_DURATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_chunk_duration),
            max_chunk_duration: std::env::var("CHUNK_MAX_DURATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_chunk_duration),
            scene_threshold: std::env::var("SCENE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.scene_threshold),
            min_sampling_fps: std::env::var("SAMPLING_MIN_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_sampling_fps),
            max_sampling_fps: std::env::var("SAMPLING_MAX_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_sampling_fps),
            motion_threshold: std::env::var("MOTION_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.motion_threshold),
            target_width: std::env::var("FRAME_TARGET_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.target_width),
            target_height: std::env::var("FRAME_TARGET_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.target_height),
            max_workers: std::env::var("PIPELINE_MAX_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_workers),
            max_file_size: std::env::var("UPLOAD_MAX_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_file_size),
            max_batch_size: std::env::var("UPLOAD_MAX_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_batch_size),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Pipeline view of this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_chunk_duration: self.min_chunk_duration,
            max_chunk_duration: self.max_chunk_duration,
            scene_threshold: self.scene_threshold,
            min_sampling_fps: self.min_sampling_fps,
            max_sampling_fps: self.max_sampling_fps,
            motion_threshold: self.motion_threshold,
            target_width: self.target_width,
            target_height: self.target_height,
            max_workers: self.max_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.min_chunk_duration, 1.0);
        assert_eq!(config.max_chunk_duration, 10.0);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.max_file_size, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.max_batch_size, 200);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_pipeline_config_mirrors_knobs() {
        let config = WorkerConfig {
            min_chunk_duration: 2.0,
            max_chunk_duration: 8.0,
            target_width: 320,
            target_height: 240,
            ..WorkerConfig::default()
        };
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.min_chunk_duration, 2.0);
        assert_eq!(pipeline.max_chunk_duration, 8.0);
        assert_eq!(pipeline.target_width, 320);
        assert_eq!(pipeline.target_height, 240);
        assert_eq!(pipeline.max_workers, config.max_workers);
    }
}
