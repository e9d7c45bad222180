//! Frame acquisition abstraction.
//!
//! The `FrameSource` trait is the seam for capture backends. A replay source
//! (`ImageSequenceSource`) is always available; webcam capture
//! (`CameraSource`) needs the `camera-opencv` feature.

#[cfg(feature = "camera-opencv")]
pub mod camera;
pub mod sequence;

#[cfg(feature = "camera-opencv")]
pub use camera::CameraSource;
pub use sequence::{ImageSequenceSource, Pacing};

use std::time::Instant;

use image::RgbImage;

use crate::error::Result;
use crate::keypoints::FrameDims;

/// One captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 8-bit RGB pixels.
    pub image: RgbImage,
    /// When the frame was captured. Detection credits violation time using
    /// the gaps between these instants.
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    /// Black frame of the given size, captured now.
    pub fn blank(height: u32, width: u32) -> Self {
        Self::new(RgbImage::new(width, height), Instant::now())
    }

    pub fn dims(&self) -> FrameDims {
        FrameDims::new(self.image.height(), self.image.width())
    }
}

/// Producer of frames in capture order.
pub trait FrameSource: Send + 'static {
    /// Next frame, or `None` once the source is exhausted.
    ///
    /// Implementations may block until the frame is available.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_reports_height_then_width() {
        let frame = Frame::blank(480, 640);
        assert_eq!(frame.dims(), FrameDims::new(480, 640));
    }
}
