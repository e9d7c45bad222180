//! # sitstraight-core
//!
//! Posture monitoring engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! FrameSource → PoseModel::predict → distance::extract → Detector::observe
//!                                                              │
//!                                                        alert_raised?
//!                                                              │
//!                                              AlertWorker → AlertSink::play
//!                                                              │
//!                                         completion → Detector::alert_finished
//! ```
//!
//! Calibration shares the first three stages and feeds a `CalibrationSession`
//! instead of the detector. Frame loops run in `spawn_blocking`; events fan out
//! over `tokio::sync::broadcast`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

use std::path::PathBuf;

pub mod alert;
pub mod audio;
pub mod buffering;
pub mod calibration;
pub mod detection;
pub mod distance;
pub mod engine;
pub mod error;
pub mod frames;
pub mod inference;
pub mod ipc;
pub mod keypoints;
pub mod thresholds;

// Convenience re-exports for downstream crates
pub use alert::{AlertSink, ClipAlertSink, LogAlertSink};
pub use calibration::{derive_thresholds, CalibrationConfig, CalibrationReport, CalibrationSample};
pub use detection::{DetectionConfig, Detector, DetectorState, Polarity};
pub use distance::{extract, Channel, DistanceVector};
pub use engine::{DiagnosticsSnapshot, EngineConfig, PostureEngine};
pub use error::PostureError;
pub use frames::{Frame, FrameSource, ImageSequenceSource, Pacing};
pub use inference::{ModelHandle, ModelVariant, PoseModel, StubPoseModel};
pub use ipc::events::{
    AlertEvent, AlertPhase, CalibrationProgressEvent, EngineStatus, EngineStatusEvent,
    PostureSampleEvent,
};
pub use keypoints::{FrameDims, Joint, Keypoint, KeypointSet};
pub use thresholds::{load_thresholds, save_thresholds, ThresholdSet};

#[cfg(feature = "camera-opencv")]
pub use frames::CameraSource;
#[cfg(feature = "onnx")]
pub use inference::{InputElement, OnnxPoseModel, OnnxPoseModelConfig};

/// Per-user data directory holding thresholds, settings and models.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("SitStraight"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("sitstraight")
    }
}
