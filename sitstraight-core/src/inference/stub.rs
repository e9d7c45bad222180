//! `StubPoseModel` — placeholder backend that returns a fixed pose.
//!
//! Lets the full calibration/detection pipeline run end-to-end without an
//! ONNX model on disk.

use tracing::debug;

use crate::error::Result;
use crate::frames::Frame;
use crate::inference::PoseModel;
use crate::keypoints::{Joint, Keypoint, KeypointSet, KEYPOINT_COUNT};

/// Fixed-output stub model.
pub struct StubPoseModel {
    pose: KeypointSet,
    frames_seen: u64,
}

impl StubPoseModel {
    /// Stub that always reports `pose`.
    pub fn new(pose: KeypointSet) -> Self {
        Self {
            pose,
            frames_seen: 0,
        }
    }

    /// A centred, upright seated pose.
    pub fn upright() -> Self {
        let mut points = vec![Keypoint::new(0.9, 0.5, 0.3); KEYPOINT_COUNT];
        points[Joint::Nose.index()] = Keypoint::new(0.30, 0.50, 0.9);
        points[Joint::LeftEye.index()] = Keypoint::new(0.26, 0.54, 0.9);
        points[Joint::RightEye.index()] = Keypoint::new(0.26, 0.46, 0.9);
        points[Joint::LeftEar.index()] = Keypoint::new(0.29, 0.59, 0.8);
        points[Joint::RightEar.index()] = Keypoint::new(0.29, 0.41, 0.8);
        points[Joint::LeftShoulder.index()] = Keypoint::new(0.60, 0.68, 0.9);
        points[Joint::RightShoulder.index()] = Keypoint::new(0.60, 0.32, 0.9);
        Self::new(KeypointSet::new(points))
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Default for StubPoseModel {
    fn default() -> Self {
        Self::upright()
    }
}

impl PoseModel for StubPoseModel {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubPoseModel::warm_up: no-op");
        Ok(())
    }

    fn predict(&mut self, _frame: &Frame) -> Result<KeypointSet> {
        self.frames_seen += 1;
        Ok(self.pose.clone())
    }
}
