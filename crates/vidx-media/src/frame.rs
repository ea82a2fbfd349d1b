//! Owned RGB frames and the pixel math used for sampling decisions.

/// Gradient magnitude above which a pixel counts as an edge.
const EDGE_MAGNITUDE_THRESHOLD: f64 = 100.0;

/// One decoded video frame, RGB24, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Raw pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap raw RGB24 bytes. Returns `None` when the buffer does not match
    /// the dimensions.
    pub fn from_rgb24(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Size of the pixel buffer in megabytes.
    pub fn memory_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }

    /// Grayscale conversion (ITU-R 601 luma weights).
    pub fn gray(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let luma =
                    0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2]);
                luma.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Standard deviation of all channel values, a cheap texture measure.
    pub fn color_variance(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let n = self.data.len() as f64;
        let mean = self.data.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var = self
            .data
            .iter()
            .map(|&v| {
                let d = f64::from(v) - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        var.sqrt()
    }

    /// Deterministic area-interpolated resize: every target pixel is the
    /// mean of its source box. A frame already at the target size is
    /// returned unchanged, so resizing is idempotent.
    pub fn resize_area(&self, target_width: u32, target_height: u32) -> Frame {
        if target_width == self.width && target_height == self.height {
            return self.clone();
        }

        let sw = self.width as usize;
        let tw = target_width as usize;
        let th = target_height as usize;
        let mut out = vec![0u8; tw * th * 3];

        for ty in 0..th {
            let y0 = ty * self.height as usize / th;
            let y1 = ((ty + 1) * self.height as usize / th).max(y0 + 1);
            for tx in 0..tw {
                let x0 = tx * sw / tw;
                let x1 = ((tx + 1) * sw / tw).max(x0 + 1);

                let mut acc = [0.0f64; 3];
                for y in y0..y1 {
                    let row = y * sw;
                    for x in x0..x1 {
                        let src = (row + x) * 3;
                        acc[0] += f64::from(self.data[src]);
                        acc[1] += f64::from(self.data[src + 1]);
                        acc[2] += f64::from(self.data[src + 2]);
                    }
                }
                let count = ((y1 - y0) * (x1 - x0)) as f64;
                let dst = (ty * tw + tx) * 3;
                for c in 0..3 {
                    out[dst + c] = (acc[c] / count).round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        Frame {
            width: target_width,
            height: target_height,
            data: out,
        }
    }
}

/// Mean absolute difference between two grayscale buffers.
///
/// The motion score of the sampling loop: higher means more change
/// between the frames.
pub fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let sum: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    sum as f64 / len as f64
}

/// Fraction of pixels classified as edges by a fixed-parameter Sobel
/// detector. Border pixels count as non-edges.
pub fn edge_density(gray: &[u8], width: u32, height: u32) -> f64 {
    let w = width as usize;
    let h = height as usize;
    if w < 3 || h < 3 || gray.len() < w * h {
        return 0.0;
    }

    let px = |x: usize, y: usize| f64::from(gray[y * w + x]);
    let mut edges = 0usize;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            if (gx * gx + gy * gy).sqrt() > EDGE_MAGNITUDE_THRESHOLD {
                edges += 1;
            }
        }
    }

    edges as f64 / (w * h) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Frame::from_rgb24(width, height, data).unwrap()
    }

    #[test]
    fn test_from_rgb24_validates_length() {
        assert!(Frame::from_rgb24(2, 2, vec![0; 12]).is_some());
        assert!(Frame::from_rgb24(2, 2, vec![0; 11]).is_none());
    }

    #[test]
    fn test_gray_of_solid_colors() {
        let white = solid_frame(2, 2, [255, 255, 255]);
        assert!(white.gray().iter().all(|&v| v == 255));

        let red = solid_frame(2, 2, [255, 0, 0]);
        // 0.299 * 255 ≈ 76
        assert!(red.gray().iter().all(|&v| v == 76));
    }

    #[test]
    fn test_mean_abs_diff() {
        assert_eq!(mean_abs_diff(&[10, 20], &[10, 20]), 0.0);
        assert_eq!(mean_abs_diff(&[0, 0], &[255, 255]), 255.0);
        assert_eq!(mean_abs_diff(&[], &[]), 0.0);
    }

    #[test]
    fn test_edge_density_uniform_is_zero() {
        let frame = solid_frame(16, 16, [128, 128, 128]);
        assert_eq!(edge_density(&frame.gray(), 16, 16), 0.0);
    }

    #[test]
    fn test_edge_density_detects_square() {
        // White square on black background.
        let mut frame = solid_frame(32, 32, [0, 0, 0]);
        for y in 8..24 {
            for x in 8..24 {
                let idx = (y * 32 + x) * 3;
                frame.data[idx] = 255;
                frame.data[idx + 1] = 255;
                frame.data[idx + 2] = 255;
            }
        }
        let density = edge_density(&frame.gray(), 32, 32);
        assert!(density > 0.0);
        assert!(density <= 1.0);
    }

    #[test]
    fn test_color_variance() {
        assert_eq!(solid_frame(4, 4, [50, 50, 50]).color_variance(), 0.0);

        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        for v in frame.data.iter_mut().skip(24) {
            *v = 255;
        }
        assert!(frame.color_variance() > 100.0);
    }

    #[test]
    fn test_resize_area_downscale() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        // Right half white: each 2x-downscaled pixel averages its box.
        for y in 0..4 {
            for x in 2..4 {
                let idx = (y * 4 + x) * 3;
                frame.data[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let small = frame.resize_area(2, 2);
        assert_eq!(small.width, 2);
        assert_eq!(small.height, 2);
        assert_eq!(&small.data[0..3], &[0, 0, 0]);
        assert_eq!(&small.data[3..6], &[255, 255, 255]);
    }

    #[test]
    fn test_resize_area_same_size_is_identity() {
        let frame = solid_frame(6, 4, [9, 8, 7]);
        assert_eq!(frame.resize_area(6, 4), frame);
    }

    #[test]
    fn test_memory_mb() {
        let frame = solid_frame(512, 512, [1, 2, 3]);
        assert!((frame.memory_mb() - 0.75).abs() < 1e-9);
    }
}
