//! Replay a directory of still images as a frame stream.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{Frame, FrameSource};
use crate::error::{PostureError, Result};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// How replayed frames are timestamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Sleep between frames to hold `fps`; timestamps are real capture times.
    RealTime { fps: f64 },
    /// No sleeping; frame `i` is stamped `start + i / fps`. Useful for
    /// replaying a recorded session faster than real time.
    Simulated { fps: f64 },
}

impl Pacing {
    fn interval(self) -> Duration {
        let fps = match self {
            Pacing::RealTime { fps } | Pacing::Simulated { fps } => fps,
        };
        Duration::from_secs_f64(1.0 / fps)
    }
}

/// Frame source backed by image files, read in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    pacing: Pacing,
    started_at: Option<Instant>,
}

impl ImageSequenceSource {
    /// Collect every image file directly inside `dir`.
    ///
    /// # Errors
    /// `PostureError::FrameSource` if the directory has no images or `fps`
    /// is not positive.
    pub fn open(dir: impl AsRef<Path>, pacing: Pacing) -> Result<Self> {
        let dir = dir.as_ref();
        let fps = match pacing {
            Pacing::RealTime { fps } | Pacing::Simulated { fps } => fps,
        };
        if !(fps.is_finite() && fps > 0.0) {
            return Err(PostureError::FrameSource(format!(
                "fps must be positive, got {fps}"
            )));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| PostureError::FrameSource(format!("{}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(PostureError::FrameSource(format!(
                "no image files in {}",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), frames = paths.len(), ?pacing, "image sequence opened");

        Ok(Self {
            paths,
            next: 0,
            pacing,
            started_at: None,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn timestamp_for(&mut self, index: usize) -> Instant {
        let start = *self.started_at.get_or_insert_with(Instant::now);
        let due = start + self.pacing.interval() * index as u32;
        match self.pacing {
            Pacing::RealTime { .. } => {
                let now = Instant::now();
                if due > now {
                    std::thread::sleep(due - now);
                }
                Instant::now()
            }
            Pacing::Simulated { .. } => due,
        }
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.next).cloned() else {
            return Ok(None);
        };
        let index = self.next;
        self.next += 1;

        let image = image::open(&path)
            .map_err(|e| PostureError::FrameSource(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let captured_at = self.timestamp_for(index);
        debug!(path = %path.display(), index, "frame decoded");

        Ok(Some(Frame::new(image, captured_at)))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn fixture_dir(name: &str, frames: u32) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sitstraight-frames-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create fixture dir");
        for i in 0..frames {
            RgbImage::new(8, 6)
                .save(dir.join(format!("frame_{i:03}.png")))
                .expect("write fixture frame");
        }
        fs::write(dir.join("notes.txt"), "not a frame").expect("write non-image");
        dir
    }

    #[test]
    fn simulated_pacing_stamps_frames_at_fixed_interval() {
        let dir = fixture_dir("simulated", 3);
        let mut source =
            ImageSequenceSource::open(&dir, Pacing::Simulated { fps: 2.0 }).expect("open");
        assert_eq!(source.len(), 3);

        let a = source.next_frame().expect("read").expect("frame 0");
        let b = source.next_frame().expect("read").expect("frame 1");
        let c = source.next_frame().expect("read").expect("frame 2");
        assert!(source.next_frame().expect("read").is_none());

        assert_eq!(b.captured_at - a.captured_at, Duration::from_millis(500));
        assert_eq!(c.captured_at - a.captured_at, Duration::from_secs(1));
        assert_eq!(a.image.dimensions(), (8, 6));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = fixture_dir("empty", 0);
        let err = ImageSequenceSource::open(&dir, Pacing::RealTime { fps: 10.0 }).unwrap_err();
        assert!(matches!(err, PostureError::FrameSource(_)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn non_positive_fps_is_rejected() {
        let dir = fixture_dir("fps", 1);
        assert!(ImageSequenceSource::open(&dir, Pacing::Simulated { fps: 0.0 }).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
