//! Motion-adaptive frame sampling.
//!
//! A chunk is decoded once at its native rate. Every frame is inspected
//! but only sampled frames are kept: motion between consecutive sampled
//! frames decides how soon the next sample lands. High motion samples at
//! the fast rate, quiet footage at the slow rate.

use std::path::Path;

use tracing::warn;
use vidx_models::Chunk;

use crate::decode::FrameStream;
use crate::frame::{edge_density, mean_abs_diff, Frame};
use crate::probe::VideoInfo;

const MOTION_WEIGHT: f64 = 0.30;
const MOTION_NORM: f64 = 50.0;
const EDGE_WEIGHT: f64 = 0.40;
const EDGE_NORM: f64 = 0.30;
const COLOR_WEIGHT: f64 = 0.30;
const COLOR_NORM: f64 = 80.0;

/// Frames kept from a chunk plus the signals measured along the way.
#[derive(Debug, Default)]
pub struct SampledFrames {
    pub frames: Vec<Frame>,
    /// Achieved sampling rate, kept frames over chunk duration.
    pub effective_fps: f64,
    /// Visual complexity in [0, 1].
    pub complexity_score: f64,
}

impl SampledFrames {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total decoded size of the kept frames in megabytes.
    pub fn memory_mb(&self) -> f64 {
        self.frames.iter().map(Frame::memory_mb).sum()
    }
}

/// Motion-adaptive sampler with configurable rate bounds.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    /// Floor sampling rate for static content.
    pub min_fps: f64,
    /// Ceiling sampling rate for high-motion content.
    pub max_fps: f64,
    /// Mean absolute grayscale difference above which content counts
    /// as high motion.
    pub motion_threshold: f64,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self {
            min_fps: 0.5,
            max_fps: 2.0,
            motion_threshold: 25.0,
        }
    }
}

impl FrameSampler {
    pub fn new(min_fps: f64, max_fps: f64, motion_threshold: f64) -> Self {
        Self {
            min_fps,
            max_fps,
            motion_threshold,
        }
    }

    /// Frame gaps for the fast and slow sampling rates at a native fps.
    pub fn sample_intervals(&self, fps: f64) -> (usize, usize) {
        let fast = ((fps / self.max_fps) as usize).max(1);
        let slow = ((fps / self.min_fps) as usize).max(1);
        (fast, slow)
    }

    /// Sample frames from one chunk of a video.
    ///
    /// Never fails: decode problems yield whatever was collected so far,
    /// possibly nothing.
    pub async fn extract(&self, path: &Path, chunk: &Chunk, info: &VideoInfo) -> SampledFrames {
        let duration = chunk.duration();
        if duration <= 0.0 {
            return SampledFrames::default();
        }

        let mut stream = match FrameStream::open(
            path,
            chunk.start_time,
            duration,
            None,
            info.width,
            info.height,
        )
        .await
        {
            Ok(stream) => stream,
            Err(err) => {
                warn!(chunk_id = %chunk.chunk_id, error = %err, "failed to open chunk for sampling");
                return SampledFrames::default();
            }
        };

        let (fast_interval, slow_interval) = self.sample_intervals(info.fps);

        let mut frames: Vec<Frame> = Vec::new();
        let mut last_gray: Option<Vec<u8>> = None;
        let mut motions: Vec<f64> = Vec::new();
        let mut edge_sum = 0.0;
        let mut color_sum = 0.0;
        let mut next_capture = 0usize;
        let mut frame_idx = 0usize;

        loop {
            let frame = match stream.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        chunk_id = %chunk.chunk_id,
                        error = %err,
                        sampled = frames.len(),
                        "decode interrupted, keeping sampled frames"
                    );
                    break;
                }
            };

            if frame_idx == next_capture {
                let gray = frame.gray();
                let motion = last_gray.as_ref().map(|prev| mean_abs_diff(prev, &gray));
                if let Some(m) = motion {
                    motions.push(m);
                }
                edge_sum += edge_density(&gray, frame.width, frame.height);
                color_sum += frame.color_variance();

                let interval = match motion {
                    Some(m) if m > self.motion_threshold => fast_interval,
                    Some(_) => slow_interval,
                    // First frame: sample aggressively until motion is measurable.
                    None => fast_interval,
                };
                next_capture = frame_idx + interval;
                last_gray = Some(gray);
                frames.push(frame);
            }
            frame_idx += 1;
        }

        if frames.is_empty() {
            return SampledFrames::default();
        }

        let count = frames.len() as f64;
        let mean_motion = if motions.is_empty() {
            0.0
        } else {
            motions.iter().sum::<f64>() / motions.len() as f64
        };
        let mean_edge = edge_sum / count;
        let mean_color = color_sum / count;

        SampledFrames {
            effective_fps: count / duration,
            complexity_score: complexity_score(mean_motion, mean_edge, mean_color),
            frames,
        }
    }
}

/// Weighted complexity score in [0, 1] from mean motion, edge density
/// and color variance.
pub fn complexity_score(mean_motion: f64, mean_edge_density: f64, mean_color_variance: f64) -> f64 {
    let raw = MOTION_WEIGHT * (mean_motion / MOTION_NORM)
        + EDGE_WEIGHT * (mean_edge_density / EDGE_NORM)
        + COLOR_WEIGHT * (mean_color_variance / COLOR_NORM);
    raw.clamp(0.0, 1.0)
}
