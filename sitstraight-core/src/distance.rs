//! Distance extraction: keypoints → six shoulder-to-landmark distances.

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::{PostureError, Result};
use crate::keypoints::{FrameDims, Joint, KeypointSet, KEYPOINT_COUNT};

/// Number of distance channels tracked per frame.
pub const CHANNEL_COUNT: usize = 6;

/// One shoulder-to-landmark distance measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    RightEar,
    LeftEar,
    RightNose,
    LeftNose,
    RightEye,
    LeftEye,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::RightEar,
        Channel::LeftEar,
        Channel::RightNose,
        Channel::LeftNose,
        Channel::RightEye,
        Channel::LeftEye,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Key used in the threshold file.
    pub fn name(self) -> &'static str {
        match self {
            Channel::RightEar => "RIGHT_EAR",
            Channel::LeftEar => "LEFT_EAR",
            Channel::RightNose => "RIGHT_NOSE",
            Channel::LeftNose => "LEFT_NOSE",
            Channel::RightEye => "RIGHT_EYE",
            Channel::LeftEye => "LEFT_EYE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Channel::ALL.into_iter().find(|c| c.name() == name)
    }

    /// The (shoulder, landmark) joint pair this channel measures.
    pub fn joints(self) -> (Joint, Joint) {
        match self {
            Channel::RightEar => (Joint::RightShoulder, Joint::RightEar),
            Channel::LeftEar => (Joint::LeftShoulder, Joint::LeftEar),
            Channel::RightNose => (Joint::RightShoulder, Joint::Nose),
            Channel::LeftNose => (Joint::LeftShoulder, Joint::Nose),
            Channel::RightEye => (Joint::RightShoulder, Joint::RightEye),
            Channel::LeftEye => (Joint::LeftShoulder, Joint::LeftEye),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Per-frame distances in pixels, indexed by [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistanceVector([f64; CHANNEL_COUNT]);

impl DistanceVector {
    pub fn new(values: [f64; CHANNEL_COUNT]) -> Self {
        Self(values)
    }

    /// Every channel set to `value`. Mostly useful in tests and replays.
    pub fn splat(value: f64) -> Self {
        Self([value; CHANNEL_COUNT])
    }

    pub fn get(&self, channel: Channel) -> f64 {
        self.0[channel.index()]
    }

    pub fn values(&self) -> &[f64; CHANNEL_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        Channel::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Copy with a single channel replaced.
    pub fn with(mut self, channel: Channel, value: f64) -> Self {
        self.0[channel.index()] = value;
        self
    }
}

impl Index<Channel> for DistanceVector {
    type Output = f64;

    fn index(&self, channel: Channel) -> &f64 {
        &self.0[channel.index()]
    }
}

/// Compute the six channel distances for one keypoint set.
///
/// Normalized `y` is scaled by the frame height and `x` by the frame width
/// before measuring, so all distances share pixel units. Confidence is not
/// consulted.
///
/// # Errors
/// `PostureError::InvalidKeypoints` if the set does not hold exactly 17
/// joints or a joint used by any channel has a non-finite coordinate.
pub fn extract(keypoints: &KeypointSet, dims: FrameDims) -> Result<DistanceVector> {
    if keypoints.len() != KEYPOINT_COUNT {
        return Err(PostureError::InvalidKeypoints(format!(
            "expected {KEYPOINT_COUNT} keypoints, got {}",
            keypoints.len()
        )));
    }

    let height = dims.height as f64;
    let width = dims.width as f64;
    let mut out = [0.0; CHANNEL_COUNT];

    for channel in Channel::ALL {
        let (a, b) = channel.joints();
        let pa = pixel_position(keypoints, a, height, width)?;
        let pb = pixel_position(keypoints, b, height, width)?;
        out[channel.index()] = ((pa.0 - pb.0).powi(2) + (pa.1 - pb.1).powi(2)).sqrt();
    }

    Ok(DistanceVector(out))
}

fn pixel_position(
    keypoints: &KeypointSet,
    joint: Joint,
    height: f64,
    width: f64,
) -> Result<(f64, f64)> {
    let kp = keypoints
        .get(joint)
        .filter(|kp| kp.is_present())
        .ok_or_else(|| PostureError::InvalidKeypoints(format!("missing joint {joint:?}")))?;
    Ok((kp.y as f64 * height, kp.x as f64 * width))
}
