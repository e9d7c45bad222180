//! Alert dispatch.
//!
//! ## Flow
//!
//! ```text
//! pipeline ──AlertRequest──► AlertWorker thread ──► AlertSink::play (blocking)
//!    ▲                                                      │
//!    └──────────────AlertCompletion (Ok / Err)──────────────┘
//! ```
//!
//! The pipeline never blocks on playback. It polls completions once per frame
//! and keeps processing frames while a clip plays.

pub mod worker;

pub use worker::{AlertCompletion, AlertRequest, AlertWorker};

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::audio::{clip::decode_wav, clip::ClipLibrary, AudioPlayback};
use crate::error::{PostureError, Result};

/// Something that can deliver one alert to the user.
pub trait AlertSink: Send + 'static {
    /// Deliver one alert. Blocks until it has finished.
    fn play(&mut self) -> Result<()>;

    /// Independent copy of this sink. Used to restart playback on a fresh
    /// worker after an alert stopped responding.
    fn boxed_clone(&self) -> Box<dyn AlertSink>;
}

/// Sink that only writes a log line. Used for headless runs.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink {
    played: u64,
}

impl LogAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> u64 {
        self.played
    }
}

impl AlertSink for LogAlertSink {
    fn play(&mut self) -> Result<()> {
        self.played += 1;
        warn!(alerts = self.played, "bad posture detected, sit straight");
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn AlertSink> {
        Box::new(self.clone())
    }
}

/// Sink that plays a random `.wav` clip from a directory on an output device.
///
/// The output stream is opened per alert and dropped afterwards, so the sink
/// stays `Send` and holds no device between alerts.
#[derive(Debug, Clone)]
pub struct ClipAlertSink {
    library: ClipLibrary,
    output_device: Option<String>,
}

impl ClipAlertSink {
    /// Load the clip library in `dir`.
    ///
    /// # Errors
    /// `PostureError::AlertDispatch` if `dir` has no `.wav` files.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            library: ClipLibrary::open(dir)?,
            output_device: None,
        })
    }

    /// Prefer the named output device over the system default.
    pub fn with_output_device(mut self, name: Option<String>) -> Self {
        self.output_device = name;
        self
    }

    pub fn clips(&self) -> &[PathBuf] {
        self.library.clips()
    }
}

impl AlertSink for ClipAlertSink {
    fn play(&mut self) -> Result<()> {
        let path = self.library.choose().to_path_buf();
        let clip = decode_wav(&path)?;
        info!(
            clip = %path.display(),
            secs = clip.duration_secs(),
            "playing alert clip"
        );
        let mut playback = AudioPlayback::open_with_preference(self.output_device.as_deref())
            .map_err(|e| PostureError::AlertDispatch(e.to_string()))?;
        playback
            .play(&clip)
            .map_err(|e| PostureError::AlertDispatch(e.to_string()))
    }

    fn boxed_clone(&self) -> Box<dyn AlertSink> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sink_counts_alerts() {
        let mut sink = LogAlertSink::new();
        sink.play().expect("log sink");
        sink.play().expect("log sink");
        assert_eq!(sink.played(), 2);
    }

    #[test]
    fn clip_sink_requires_clips() {
        let dir = std::env::temp_dir().join(format!(
            "sitstraight-alert-empty-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create dir");
        assert!(matches!(
            ClipAlertSink::open(&dir),
            Err(PostureError::AlertDispatch(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
