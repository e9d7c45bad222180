//! Live webcam capture through OpenCV.

use std::time::Instant;

use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, info};

use super::{Frame, FrameSource};
use crate::error::{PostureError, Result};

/// Frame source reading from a capture device. Frames are stamped when
/// `read` returns.
pub struct CameraSource {
    capture: VideoCapture,
    index: i32,
    frames: u64,
}

impl CameraSource {
    /// Open capture device `index` (0 is the system's first webcam).
    ///
    /// # Errors
    /// `PostureError::FrameSource` if OpenCV cannot open the device.
    pub fn open(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY).map_err(camera_error)?;
        if !capture.is_opened().map_err(camera_error)? {
            return Err(PostureError::FrameSource(format!(
                "camera {index} could not be opened"
            )));
        }
        info!(index, "camera opened");
        Ok(Self {
            capture,
            index,
            frames: 0,
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut bgr = Mat::default();
        let grabbed = self.capture.read(&mut bgr).map_err(camera_error)?;
        let captured_at = Instant::now();
        if !grabbed || bgr.empty() {
            return Err(PostureError::FrameSource(format!(
                "camera {} returned no frame",
                self.index
            )));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(camera_error)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let bytes = rgb.data_bytes().map_err(camera_error)?.to_vec();
        let image = RgbImage::from_raw(width, height, bytes).ok_or_else(|| {
            PostureError::FrameSource(format!("camera frame {width}x{height} has a short buffer"))
        })?;

        self.frames += 1;
        debug!(index = self.index, frame = self.frames, width, height, "camera frame");
        Ok(Some(Frame::new(image, captured_at)))
    }
}

fn camera_error(e: opencv::Error) -> PostureError {
    PostureError::FrameSource(format!("camera: {e}"))
}
