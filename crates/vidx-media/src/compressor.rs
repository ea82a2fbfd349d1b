//! Frame compression by area-interpolated downscaling.

use tracing::debug;

use crate::frame::Frame;

/// Resizes sampled frames to a fixed target resolution.
#[derive(Debug, Clone)]
pub struct Compressor {
    pub target_width: u32,
    pub target_height: u32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            target_width: 640,
            target_height: 480,
        }
    }
}

impl Compressor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Resize every frame to the target resolution.
    ///
    /// Frames already at the target pass through unchanged, so running
    /// the compressor on its own output is a no-op.
    pub fn compress(&self, frames: Vec<Frame>) -> Vec<Frame> {
        if frames.is_empty() {
            return frames;
        }

        let ratio = self.ratio(
            (frames[0].width, frames[0].height),
            (self.target_width, self.target_height),
        );
        debug!(
            frames = frames.len(),
            target_width = self.target_width,
            target_height = self.target_height,
            compression_ratio = format!("{ratio:.2}"),
            "compressing frames"
        );

        frames
            .into_iter()
            .map(|frame| frame.resize_area(self.target_width, self.target_height))
            .collect()
    }

    /// Pixel-count ratio between an original and a new shape.
    pub fn ratio(&self, original: (u32, u32), new: (u32, u32)) -> f64 {
        let orig_pixels = u64::from(original.0) * u64::from(original.1);
        let new_pixels = u64::from(new.0) * u64::from(new.1);
        if new_pixels == 0 {
            return 1.0;
        }
        orig_pixels as f64 / new_pixels as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_rgb24(width, height, vec![value; (width * height * 3) as usize])
            .expect("valid frame")
    }

    #[test]
    fn test_frames_resized_to_target() {
        let compressor = Compressor::new(320, 240);
        let frames = vec![solid_frame(640, 480, 100), solid_frame(1280, 720, 50)];

        let compressed = compressor.compress(frames);
        assert_eq!(compressed.len(), 2);
        for frame in &compressed {
            assert_eq!((frame.width, frame.height), (320, 240));
        }
    }

    #[test]
    fn test_compress_is_idempotent() {
        let compressor = Compressor::new(320, 240);
        let once = compressor.compress(vec![solid_frame(640, 480, 77)]);
        let twice = compressor.compress(once.clone());
        assert_eq!(once[0].data, twice[0].data);
        assert_eq!((twice[0].width, twice[0].height), (320, 240));
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let compressor = Compressor::default();
        assert!(compressor.compress(Vec::new()).is_empty());
    }

    #[test]
    fn test_ratio() {
        let compressor = Compressor::default();
        assert_eq!(compressor.ratio((1280, 720), (640, 360)), 4.0);
        assert_eq!(compressor.ratio((640, 480), (640, 480)), 1.0);
    }

    #[test]
    fn test_ratio_guards_zero_target() {
        let compressor = Compressor::default();
        assert_eq!(compressor.ratio((640, 480), (0, 0)), 1.0);
    }
}
