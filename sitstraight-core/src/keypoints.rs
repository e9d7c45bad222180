//! Pose keypoint types produced by the pose model.
//!
//! Keypoint order follows the 17-joint COCO layout emitted by MoveNet
//! single-pose models. Coordinates are normalized to `[0, 1]` relative to the
//! frame; `y` comes first, matching the model's `(y, x, score)` output.

use serde::{Deserialize, Serialize};

/// Number of joints in a MoveNet/COCO keypoint set.
pub const KEYPOINT_COUNT: usize = 17;

/// Named body joints, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const ALL: [Joint; KEYPOINT_COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// Position of this joint in the model output.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One detected joint: normalized position plus model confidence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub y: f32,
    pub x: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(y: f32, x: f32, confidence: f32) -> Self {
        Self { y, x, confidence }
    }

    /// A joint is usable for geometry when both coordinates are finite.
    pub fn is_present(&self) -> bool {
        self.y.is_finite() && self.x.is_finite()
    }
}

/// Keypoints for one frame, as returned by the pose model.
///
/// Length is not enforced here: model backends hand over whatever they
/// decoded and the distance extractor rejects malformed sets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeypointSet {
    points: Vec<Keypoint>,
}

impl KeypointSet {
    pub fn new(points: Vec<Keypoint>) -> Self {
        Self { points }
    }

    /// All-zero, zero-confidence keypoints. Substituted by callers when a
    /// prediction comes back empty.
    pub fn zeroed() -> Self {
        Self::new(vec![Keypoint::default(); KEYPOINT_COUNT])
    }

    /// Build from flat `(y, x, score)` triples as laid out in the model's
    /// `[1, 1, 17, 3]` output tensor.
    pub fn from_triples(flat: &[f32]) -> Self {
        let points = flat
            .chunks_exact(3)
            .map(|t| Keypoint::new(t[0], t[1], t[2]))
            .collect();
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Keypoint] {
        &self.points
    }

    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.points.get(joint.index())
    }

    /// Mean confidence over all joints; `0.0` for an empty set.
    pub fn mean_confidence(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.confidence).sum::<f32>() / self.points.len() as f32
    }
}

/// Pixel dimensions of the frame the keypoints were predicted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDims {
    pub height: u32,
    pub width: u32,
}

impl FrameDims {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}
