//! Scene boundary detection from color histograms.
//!
//! Consecutive frames are reduced to HSV histograms and compared with a
//! chi-squared distance. The distance is reported on a 0-100 score scale;
//! a score above the configured threshold opens a new scene. A minimum
//! scene gap debounces rapid flashes.

use tracing::debug;

/// Scene boundary detector over pre-extracted frame histograms.
#[derive(Debug, Clone)]
pub struct SceneDetector {
    /// Cut score threshold on a 0-100 scale; lower is more sensitive.
    threshold: f64,
    /// Minimum frames between scene starts.
    min_scene_frames: usize,
    /// Histogram bins per HSV channel.
    histogram_bins: usize,
}

impl SceneDetector {
    /// Create a detector with the given sensitivity threshold.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            min_scene_frames: 5,
            histogram_bins: 16,
        }
    }

    /// Set the minimum scene length in frames.
    pub fn with_min_frames(mut self, min_frames: usize) -> Self {
        self.min_scene_frames = min_frames.max(1);
        self
    }

    /// Detect scene spans from frame histograms.
    ///
    /// Returns contiguous `(start, end)` second pairs covering the whole
    /// timeline; the final span ends at `total_duration` when known,
    /// otherwise at the sampled extent.
    pub fn detect(
        &self,
        histograms: &[Vec<f64>],
        sample_fps: f64,
        total_duration: f64,
    ) -> Vec<(f64, f64)> {
        if histograms.is_empty() || sample_fps <= 0.0 {
            return Vec::new();
        }

        let mut boundaries: Vec<usize> = vec![0];
        for i in 1..histograms.len() {
            let score = self.cut_score(&histograms[i - 1], &histograms[i]);
            if score > self.threshold {
                let last = *boundaries.last().unwrap_or(&0);
                if i - last >= self.min_scene_frames {
                    debug!(frame = i, score, "scene boundary");
                    boundaries.push(i);
                } else {
                    debug!(frame = i, score, gap = i - last, "boundary debounced");
                }
            }
        }

        let sampled_end = histograms.len() as f64 / sample_fps;
        let end = if total_duration > 0.0 {
            total_duration.max(sampled_end)
        } else {
            sampled_end
        };

        let mut scenes = Vec::with_capacity(boundaries.len());
        for (idx, &start_frame) in boundaries.iter().enumerate() {
            let start = start_frame as f64 / sample_fps;
            let scene_end = match boundaries.get(idx + 1) {
                Some(&next) => next as f64 / sample_fps,
                None => end,
            };
            if scene_end > start {
                scenes.push((start, scene_end));
            }
        }
        scenes
    }

    /// Chi-squared histogram distance on a 0-100 score scale.
    pub fn cut_score(&self, h1: &[f64], h2: &[f64]) -> f64 {
        chi_squared_distance(h1, h2) * 100.0
    }

    /// Compute an HSV histogram for an RGB24 frame, flattened to
    /// `bins^3` normalized entries.
    pub fn compute_histogram(&self, rgb_data: &[u8], width: u32, height: u32) -> Vec<f64> {
        let bins = self.histogram_bins;
        let mut histogram = vec![0.0; bins * bins * bins];

        let pixel_count = (width as usize) * (height as usize);
        if rgb_data.len() < pixel_count * 3 {
            return histogram;
        }

        for i in 0..pixel_count {
            let r = f64::from(rgb_data[i * 3]) / 255.0;
            let g = f64::from(rgb_data[i * 3 + 1]) / 255.0;
            let b = f64::from(rgb_data[i * 3 + 2]) / 255.0;

            let (h, s, v) = rgb_to_hsv(r, g, b);

            let h_bin = ((h / 360.0) * bins as f64).min(bins as f64 - 1.0) as usize;
            let s_bin = (s * bins as f64).min(bins as f64 - 1.0) as usize;
            let v_bin = (v * bins as f64).min(bins as f64 - 1.0) as usize;

            histogram[h_bin * bins * bins + s_bin * bins + v_bin] += 1.0;
        }

        let total: f64 = histogram.iter().sum();
        if total > 0.0 {
            for val in &mut histogram {
                *val /= total;
            }
        }

        histogram
    }
}

/// Chi-squared distance between normalized histograms, in [0, ~1].
///
/// Formula: sum((h1[i] - h2[i])^2 / (h1[i] + h2[i] + epsilon)) / 2
fn chi_squared_distance(h1: &[f64], h2: &[f64]) -> f64 {
    const EPSILON: f64 = 1e-10;

    if h1.len() != h2.len() {
        return f64::MAX;
    }

    let mut distance = 0.0;
    for (a, b) in h1.iter().zip(h2.iter()) {
        let diff = a - b;
        distance += (diff * diff) / (a + b + EPSILON);
    }

    distance / 2.0
}

/// Convert RGB in [0, 1] to HSV with H in [0, 360) and S, V in [0, 1].
fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max == 0.0 { 0.0 } else { delta / max };

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    (h, s, v)
}
