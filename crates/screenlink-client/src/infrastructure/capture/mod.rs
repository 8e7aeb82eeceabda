//! Frame sources.
//!
//! [`SyntheticSource`] renders a moving greyscale gradient as a binary PGM
//! image, so the whole pipeline can run on machines without a display.

use crate::application::stream_frames::{CaptureError, FrameSource};

/// Largest frame the synthetic source will render, in pixels.
const MAX_PIXELS: u64 = 7680 * 4320;

#[derive(Debug, Default)]
pub struct SyntheticSource {
    tick: u8,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSource for SyntheticSource {
    fn capture(&mut self, width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 || pixels > MAX_PIXELS {
            return Err(CaptureError(format!("unsupported size {width}x{height}")));
        }
        let header = format!("P5\n{width} {height}\n255\n");
        let mut image = Vec::with_capacity(header.len() + pixels as usize);
        image.extend_from_slice(header.as_bytes());
        for y in 0..height {
            for x in 0..width {
                image.push((x.wrapping_add(y) as u8).wrapping_add(self.tick));
            }
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(image)
    }
}
