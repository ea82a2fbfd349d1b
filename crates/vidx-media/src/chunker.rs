//! Scene-constrained video chunking.
//!
//! Scenes come from low-rate histogram sampling; spans shorter than the
//! minimum are merged forward and spans longer than the maximum are split
//! into equal parts. When scene detection yields nothing usable the video
//! is cut into fixed-length chunks instead.

use std::path::Path;

use tracing::{debug, warn};
use vidx_models::{Chunk, VideoId};

use crate::decode::FrameStream;
use crate::probe::VideoInfo;
use crate::scene::SceneDetector;

/// Sampling rate for the scene detection pass.
const SCENE_SAMPLE_FPS: f64 = 5.0;
/// Thumbnail size for histogram extraction.
const SCENE_THUMB_WIDTH: u32 = 160;
const SCENE_THUMB_HEIGHT: u32 = 90;
/// Minimum scene length during detection, in sampled frames.
const MIN_SCENE_FRAMES: usize = 5;

/// Splits a video into chunks aligned to scene boundaries where possible.
#[derive(Debug, Clone)]
pub struct Chunker {
    /// Minimum chunk duration in seconds.
    pub min_duration: f64,
    /// Maximum chunk duration in seconds.
    pub max_duration: f64,
    /// Scene cut sensitivity on a 0-100 scale.
    pub scene_threshold: f64,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            min_duration: 5.0,
            max_duration: 20.0,
            scene_threshold: 13.0,
        }
    }
}

impl Chunker {
    pub fn new(min_duration: f64, max_duration: f64, scene_threshold: f64) -> Self {
        Self {
            min_duration,
            max_duration,
            scene_threshold,
        }
    }

    /// Segment a video into chunks.
    ///
    /// Never fails: scene detection problems fall back to fixed-length
    /// chunks, and a video with no usable duration yields an empty list.
    pub async fn segment(&self, path: &Path, video_id: &VideoId, info: &VideoInfo) -> Vec<Chunk> {
        if info.duration <= 0.0 {
            warn!(video_id = %video_id, "no usable duration, skipping chunking");
            return Vec::new();
        }

        let scenes = match self.detect_scenes(path, info).await {
            Ok(scenes) if !scenes.is_empty() => scenes,
            Ok(_) => {
                debug!(video_id = %video_id, "no scenes detected, using fixed chunks");
                self.fixed_chunks(info.duration)
            }
            Err(err) => {
                warn!(video_id = %video_id, error = %err, "scene detection failed, using fixed chunks");
                self.fixed_chunks(info.duration)
            }
        };

        let spans = self.constrain_scenes(&scenes);
        let chunks = self.build_chunks(video_id, &spans);
        debug!(
            video_id = %video_id,
            scenes = scenes.len(),
            chunks = chunks.len(),
            "segmented video"
        );
        chunks
    }

    /// Run the low-rate histogram pass and detect scene spans.
    async fn detect_scenes(
        &self,
        path: &Path,
        info: &VideoInfo,
    ) -> crate::error::MediaResult<Vec<(f64, f64)>> {
        let detector = SceneDetector::new(self.scene_threshold).with_min_frames(MIN_SCENE_FRAMES);

        let mut stream = FrameStream::open(
            path,
            0.0,
            info.duration,
            Some(SCENE_SAMPLE_FPS),
            SCENE_THUMB_WIDTH,
            SCENE_THUMB_HEIGHT,
        )
        .await?;

        let mut histograms = Vec::new();
        while let Some(frame) = stream.next_frame().await? {
            histograms.push(detector.compute_histogram(&frame.data, frame.width, frame.height));
        }

        Ok(detector.detect(&histograms, SCENE_SAMPLE_FPS, info.duration))
    }

    /// Enforce duration bounds on scene spans.
    ///
    /// Spans below the minimum absorb following spans until long enough;
    /// spans above the maximum split into equal parts. A trailing short
    /// span with nothing left to absorb is kept as-is.
    pub fn constrain_scenes(&self, scenes: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let mut merged: Vec<(f64, f64)> = Vec::new();
        let mut i = 0;
        while i < scenes.len() {
            let (start, mut end) = scenes[i];
            i += 1;
            while end - start < self.min_duration && i < scenes.len() {
                end = scenes[i].1;
                i += 1;
            }
            merged.push((start, end));
        }

        let mut constrained = Vec::with_capacity(merged.len());
        for (start, end) in merged {
            let duration = end - start;
            if duration <= 0.0 {
                continue;
            }
            if duration > self.max_duration {
                let parts = (duration / self.max_duration).ceil() as usize;
                let part_duration = duration / parts as f64;
                for p in 0..parts {
                    let s = start + p as f64 * part_duration;
                    let e = if p + 1 == parts { end } else { s + part_duration };
                    constrained.push((s, e));
                }
            } else {
                constrained.push((start, end));
            }
        }
        constrained
    }

    /// Cut a duration into fixed-length chunks at the midpoint of the
    /// configured bounds. The tail chunk may be shorter.
    pub fn fixed_chunks(&self, duration: f64) -> Vec<(f64, f64)> {
        if duration <= 0.0 {
            return Vec::new();
        }

        let target = (self.min_duration + self.max_duration) / 2.0;
        let mut chunks = Vec::new();
        let mut start = 0.0;
        while start < duration {
            let end = (start + target).min(duration);
            chunks.push((start, end));
            start = end;
        }
        chunks
    }

    /// Assign sequential chunk identifiers to spans.
    fn build_chunks(&self, video_id: &VideoId, spans: &[(f64, f64)]) -> Vec<Chunk> {
        spans
            .iter()
            .filter(|(start, end)| end > start)
            .enumerate()
            .map(|(index, &(start, end))| Chunk::new(video_id, index, start, end))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> Chunker {
        Chunker::new(5.0, 20.0, 13.0)
    }

    #[test]
    fn test_short_scenes_merge_forward() {
        let spans = chunker().constrain_scenes(&[(0.0, 2.0), (2.0, 4.0), (4.0, 9.0)]);
        assert_eq!(spans, vec![(0.0, 9.0)]);
    }

    #[test]
    fn test_long_scene_splits_equally() {
        let spans = chunker().constrain_scenes(&[(0.0, 45.0)]);
        assert_eq!(spans.len(), 3);
        for (start, end) in &spans {
            assert!((end - start - 15.0).abs() < 1e-9);
        }
        assert_eq!(spans[0].0, 0.0);
        assert_eq!(spans[2].1, 45.0);
    }

    #[test]
    fn test_scene_at_max_bound_kept_whole() {
        let spans = chunker().constrain_scenes(&[(0.0, 20.0)]);
        assert_eq!(spans, vec![(0.0, 20.0)]);
    }

    #[test]
    fn test_trailing_short_scene_kept() {
        let spans = chunker().constrain_scenes(&[(0.0, 6.0), (6.0, 7.0)]);
        assert_eq!(spans, vec![(0.0, 6.0), (6.0, 7.0)]);
    }

    #[test]
    fn test_merge_then_split() {
        // Short scenes absorb forward into one long span, which then splits.
        let spans = chunker().constrain_scenes(&[(0.0, 1.0), (1.0, 2.0), (2.0, 50.0)]);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].0, 0.0);
        assert_eq!(spans[2].1, 50.0);
        for (start, end) in &spans {
            let d = end - start;
            assert!(d <= 20.0 + 1e-9, "span {d} exceeds max");
        }
    }

    #[test]
    fn test_spans_stay_contiguous() {
        let spans = chunker().constrain_scenes(&[(0.0, 3.0), (3.0, 30.0), (30.0, 42.0)]);
        for pair in spans.windows(2) {
            assert!((pair[0].1 - pair[1].0).abs() < 1e-9);
        }
        assert_eq!(spans.first().unwrap().0, 0.0);
        assert_eq!(spans.last().unwrap().1, 42.0);
    }

    #[test]
    fn test_fixed_chunks_use_midpoint_duration() {
        let chunks = chunker().fixed_chunks(30.0);
        assert_eq!(
            chunks,
            vec![(0.0, 12.5), (12.5, 25.0), (25.0, 30.0)]
        );
    }

    #[test]
    fn test_fixed_chunks_empty_for_zero_duration() {
        assert!(chunker().fixed_chunks(0.0).is_empty());
        assert!(chunker().fixed_chunks(-1.0).is_empty());
    }

    #[test]
    fn test_chunk_ids_are_sequential() {
        let video_id = VideoId::from("vid-1");
        let chunks = chunker().build_chunks(&video_id, &[(0.0, 10.0), (10.0, 20.0), (20.0, 25.0)]);
        assert_eq!(chunks[0].chunk_id, "vid-1_chunk_0000");
        assert_eq!(chunks[1].chunk_id, "vid-1_chunk_0001");
        assert_eq!(chunks[2].chunk_id, "vid-1_chunk_0002");
    }

    #[test]
    fn test_degenerate_spans_skipped() {
        let video_id = VideoId::from("vid-1");
        let chunks = chunker().build_chunks(&video_id, &[(0.0, 10.0), (10.0, 10.0)]);
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_segment_empty_for_zero_duration() {
        let info = VideoInfo {
            duration: 0.0,
            width: 640,
            height: 480,
            fps: 30.0,
            frame_count: 0,
        };
        let chunks = chunker()
            .segment(Path::new("/nonexistent.mp4"), &VideoId::from("vid-1"), &info)
            .await;
        assert!(chunks.is_empty());
    }
}
