//! FFprobe video information with per-source caching.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{MediaError, MediaResult};

/// Fallback frame rate when a source reports an invalid one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps), never zero or NaN
    pub fps: f64,
    /// Total frame count, zero when the container does not report one
    pub frame_count: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Probe a video file for information.
///
/// Invalid frame rates are replaced with [`DEFAULT_FPS`] and missing frame
/// counts are estimated from duration, so callers never divide by zero.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_video("No video stream found"))?;

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(DEFAULT_FPS);
    let fps = sanitize_fps(fps, path);

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = video_stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|&n| n > 0)
        .map(|n| n as u64)
        .unwrap_or_else(|| {
            // Many containers omit nb_frames; estimate from duration.
            (duration * fps).round().max(0.0) as u64
        });

    // Prefer container duration; reconstruct from frames when it is missing.
    let duration = if duration > 0.0 {
        duration
    } else {
        frame_count as f64 / fps
    };

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        frame_count,
    })
}

fn sanitize_fps(fps: f64, path: &Path) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        warn!(path = %path.display(), fps, "invalid frame rate, using default {}", DEFAULT_FPS);
        DEFAULT_FPS
    }
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

/// Per-source probe cache so chunking and sampling never re-probe the
/// same file within one pipeline run.
#[derive(Debug, Default)]
pub struct ProbeCache {
    entries: Mutex<HashMap<PathBuf, VideoInfo>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe a source, serving repeated lookups from the cache.
    pub async fn info(&self, path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
        let path = path.as_ref();
        let mut entries = self.entries.lock().await;
        if let Some(info) = entries.get(path) {
            return Ok(info.clone());
        }
        let info = probe_video(path).await?;
        entries.insert(path.to_path_buf(), info.clone());
        Ok(info)
    }
}
