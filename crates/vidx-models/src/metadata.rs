//! Per-chunk metadata and the vector-index payload contract.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ids::VideoId;

/// Start/end offsets of a chunk within its source video, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimestampRange {
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
}

/// Source-file details attached to every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileInfo {
    /// Filename as uploaded
    pub filename: String,
    /// Container format, taken from the filename extension (`mp4` fallback)
    #[serde(rename = "type")]
    pub file_type: String,
    /// Blob-store identifier of the uploaded source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_identifier: Option<String>,
}

impl FileInfo {
    /// Build file info for an upload, deriving the container format from
    /// the filename extension.
    pub fn for_upload(filename: impl Into<String>, hashed_identifier: Option<String>) -> Self {
        let filename = filename.into();
        let file_type = file_type_of(&filename);
        Self {
            filename,
            file_type,
            hashed_identifier,
        }
    }
}

/// Container format from a filename extension, lowercased, `mp4` when absent.
pub fn file_type_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "mp4".to_string())
}

/// Metadata describing one processed chunk.
///
/// The nested `timestamp_range` and `file_info` blocks exist for the job
/// record; before a chunk is written to the vector index they must pass
/// through [`ChunkMetadata::flatten`], which produces the flat-scalar
/// payload the index accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkMetadata {
    /// Chunk identifier (`{video_id}_chunk_{NNNN}`)
    pub chunk_id: String,
    /// Source video identifier
    pub video_id: VideoId,
    /// Time range covered by this chunk
    pub timestamp_range: TimestampRange,
    /// Chunk length in seconds
    pub duration: f64,
    /// Number of frames sampled from this chunk
    pub frame_count: u32,
    /// Achieved sampling rate (frames / chunk duration)
    pub sampling_fps: f64,
    /// Visual complexity heuristic in [0, 1]
    pub complexity_score: f64,
    /// Source-file details
    pub file_info: FileInfo,
    /// When the chunk finished processing
    pub processed_at: DateTime<Utc>,
}

impl ChunkMetadata {
    /// Flatten into the payload shape the vector index accepts: scalar
    /// values only, nested blocks expanded, `null` entries dropped.
    ///
    /// `timestamp_range` becomes `start_time_s`/`end_time_s` and the
    /// `file_info` block becomes `file_*` keys. This shape is a contract
    /// with the external index, which rejects nulls and nested values.
    pub fn flatten(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("chunk_id".into(), json!(self.chunk_id));
        payload.insert("video_id".into(), json!(self.video_id));
        payload.insert("start_time_s".into(), json!(self.timestamp_range.start));
        payload.insert("end_time_s".into(), json!(self.timestamp_range.end));
        payload.insert("duration".into(), json!(self.duration));
        payload.insert("frame_count".into(), json!(self.frame_count));
        payload.insert("sampling_fps".into(), json!(self.sampling_fps));
        payload.insert("complexity_score".into(), json!(self.complexity_score));
        payload.insert("file_filename".into(), json!(self.file_info.filename));
        payload.insert("file_type".into(), json!(self.file_info.file_type));
        if let Some(hashed) = &self.file_info.hashed_identifier {
            payload.insert("file_hashed_identifier".into(), json!(hashed));
        }
        payload.insert("processed_at".into(), json!(self.processed_at.to_rfc3339()));

        // The index rejects null values outright.
        payload.retain(|_, v| !v.is_null());
        payload
    }
}
