//! FFmpeg CLI wrapper for video segmentation and frame sampling.
//!
//! This crate provides:
//! - Video probing with cached metadata (ffprobe)
//! - Raw RGB frame decoding over a pipe (ffmpeg)
//! - Scene-constrained chunking with a fixed-duration fallback
//! - Motion-adaptive frame sampling with a complexity score
//! - Area-interpolated frame compression
//! - The per-video pipeline coordinator with a bounded worker pool
//!
//! FFmpeg and ffprobe are driven as external commands and never linked.

pub mod chunker;
pub mod compressor;
pub mod decode;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod probe;
pub mod sampler;
pub mod scene;

pub use chunker::Chunker;
pub use compressor::Compressor;
pub use decode::FrameStream;
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use pipeline::{collect_stats, ChunkResult, PipelineConfig, PipelineCoordinator};
pub use probe::{probe_video, ProbeCache, VideoInfo};
pub use sampler::{FrameSampler, SampledFrames};
pub use scene::SceneDetector;
