//! Raw RGB frame decoding over an FFmpeg pipe.

use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Streaming decoder for a time window of a video.
///
/// Spawns one `ffmpeg` child that seeks to the window start and writes
/// RGB24 rawvideo to stdout; frames are sliced off the pipe one at a time.
/// One stream is one seek plus a single forward pass, and independent
/// streams over the same source share no decode state.
#[derive(Debug)]
pub struct FrameStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frame_len: usize,
    done: bool,
}

impl FrameStream {
    /// Open a decode window.
    ///
    /// `sample_fps` inserts an fps filter for downsampled passes; `None`
    /// decodes every frame. Output is scaled to `width`x`height`.
    pub async fn open(
        path: impl AsRef<Path>,
        start_time: f64,
        duration: f64,
        sample_fps: Option<f64>,
        width: u32,
        height: u32,
    ) -> MediaResult<Self> {
        let path = path.as_ref();

        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        if width == 0 || height == 0 {
            return Err(MediaError::invalid_video("zero frame dimensions"));
        }

        let filter = match sample_fps {
            Some(fps) => format!("fps={},scale={}:{}", fps, width, height),
            None => format!("scale={}:{}", width, height),
        };

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-ss",
            &format!("{:.3}", start_time),
            "-t",
            &format!("{:.3}", duration),
            "-i",
        ])
        .arg(path)
        .args(["-vf", &filter, "-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        debug!(
            path = %path.display(),
            start_time,
            duration,
            filter = %filter,
            "spawning ffmpeg decode"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;

        // ffmpeg blocks once the stderr pipe fills, stalling stdout, so
        // diagnostics are drained concurrently while frames stream.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut diagnostics = String::new();
                let mut reader = BufReader::new(stderr);
                let _ = reader.read_to_string(&mut diagnostics).await;
                diagnostics
            })
        });

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
            width,
            height,
            frame_len: (width as usize) * (height as usize) * 3,
            done: false,
        })
    }

    /// Read the next frame, or `None` once the window is exhausted.
    /// A trailing partial frame is discarded.
    pub async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {
                let frame = Frame::from_rgb24(self.width, self.height, buf)
                    .ok_or_else(|| MediaError::internal("frame buffer size mismatch"))?;
                Ok(Some(frame))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.done = true;
                let status = self.child.wait().await?;
                if !status.success() {
                    let diagnostics = match self.stderr_task.take() {
                        Some(task) => task.await.unwrap_or_default(),
                        None => String::new(),
                    };
                    warn!(
                        exit_code = ?status.code(),
                        stderr = %diagnostics.trim(),
                        "ffmpeg decode exited non-zero"
                    );
                }
                Ok(None)
            }
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    /// Drain the remaining frames into a vector.
    pub async fn collect_frames(mut self) -> MediaResult<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame().await? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_dimensions_rejected() {
        let err = FrameStream::open("/nonexistent.mp4", 0.0, 1.0, None, 0, 480)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    /// A garbage source makes ffmpeg write diagnostics instead of frames.
    /// The stream must terminate even when those diagnostics exceed the
    /// pipe buffer. Requires ffmpeg.
    #[tokio::test]
    async fn test_corrupt_source_terminates_without_stalling() {
        if which::which("ffmpeg").is_err() {
            eprintln!("ffmpeg not found, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp4");
        let mut noise = Vec::with_capacity(1 << 20);
        for i in 0..(1 << 20) {
            noise.push((i * 31 % 251) as u8);
        }
        std::fs::write(&path, noise).unwrap();

        let stream = match FrameStream::open(&path, 0.0, 5.0, None, 320, 240).await {
            Ok(stream) => stream,
            // Spawn-time rejection is also a valid non-stalling outcome.
            Err(_) => return,
        };
        let frames = tokio::time::timeout(Duration::from_secs(30), stream.collect_frames())
            .await
            .expect("decode of a corrupt source must not stall");
        assert!(frames.unwrap_or_default().is_empty());
    }
}
