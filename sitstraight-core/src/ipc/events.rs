//! Event types emitted by `PostureEngine`.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `PostureSampleEvent` | `subscribe_samples()` |
//! | `AlertEvent` | `subscribe_alerts()` |
//! | `CalibrationProgressEvent` | `subscribe_calibration()` |
//! | `EngineStatusEvent` | `subscribe_status()` |

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationPhase;
use crate::detection::DetectorState;
use crate::distance::{Channel, CHANNEL_COUNT};

// ---------------------------------------------------------------------------
// Detection samples
// ---------------------------------------------------------------------------

/// One processed frame during detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureSampleEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Pixel distances in channel order.
    pub distances: [f64; CHANNEL_COUNT],
    /// Whether any channel violated its threshold.
    pub violated: bool,
    /// Channels that violated on this frame.
    pub violating: Vec<Channel>,
    /// Bad-posture time accumulated so far, in seconds.
    pub accumulated_secs: f64,
    pub state: DetectorState,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPhase {
    /// Sustained bad posture reached the time threshold; playback requested.
    Raised,
    /// The sink reported playback finished.
    Completed,
    /// The sink failed or timed out; monitoring resumed anyway.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub seq: u64,
    /// Identifier shared by the `raised` and closing events of one alert.
    pub alert_id: u64,
    pub phase: AlertPhase,
    /// Failure detail for `failed` events.
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Calibration progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationProgressEvent {
    pub phase: CalibrationPhase,
    /// Seconds left in the current phase.
    pub remaining_secs: f64,
    pub good_frames: usize,
    pub bad_frames: usize,
}

// ---------------------------------------------------------------------------
// Engine status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the posture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created, nothing running.
    Idle,
    /// Loading the pose model and running a dummy inference.
    WarmingUp,
    /// A calibration session is collecting samples.
    Calibrating,
    /// Detection loop is running.
    Monitoring,
    /// A session ended; the engine may be started again.
    Stopped,
    /// A session failed.
    Error,
}
