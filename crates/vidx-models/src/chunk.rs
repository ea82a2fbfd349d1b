//! Time-ranged video chunks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::VideoId;

/// A contiguous time range of a source video, treated as one
/// processing and indexing unit.
///
/// Chunks are produced once by the chunker and are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Chunk {
    /// Identifier in the form `{video_id}_chunk_{NNNN}`, unique within a video
    pub chunk_id: String,
    /// Start offset in seconds from the beginning of the video
    pub start_time: f64,
    /// End offset in seconds, always greater than `start_time`
    pub end_time: f64,
}

impl Chunk {
    /// Build a chunk from a video id and a sequential index.
    pub fn new(video_id: &VideoId, index: usize, start_time: f64, end_time: f64) -> Self {
        Self {
            chunk_id: chunk_id(video_id, index),
            start_time,
            end_time,
        }
    }

    /// Chunk length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Format a chunk identifier: `{video_id}_chunk_{NNNN}` with a
/// zero-padded four-digit index.
pub fn chunk_id(video_id: &VideoId, index: usize) -> String {
    format!("{}_chunk_{:04}", video_id, index)
}

/// Split a chunk identifier back into its video id and index.
///
/// Splits on the last `_chunk_` occurrence so video ids containing the
/// separator themselves still parse. Returns `None` when the suffix is
/// not a number.
pub fn parse_chunk_id(id: &str) -> Option<(VideoId, usize)> {
    let (video, index) = id.rsplit_once("_chunk_")?;
    let index: usize = index.parse().ok()?;
    Some((VideoId::from(video), index))
}
