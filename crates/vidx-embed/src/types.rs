//! Wire types for the embedding service.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use vidx_media::Frame;

/// One frame in an embedding request, raw RGB24 encoded as base64.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedFrame {
    pub width: u32,
    pub height: u32,
    pub data: String,
}

impl EmbedFrame {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            data: STANDARD.encode(&frame.data),
        }
    }
}

/// Request body for `POST /embed`.
///
/// The service embeds each frame and mean-pools into one normalized
/// vector for the whole set.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedRequest {
    pub frames: Vec<EmbedFrame>,
}

/// Response body for `POST /embed`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
