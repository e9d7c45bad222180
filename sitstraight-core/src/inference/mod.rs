//! Pose model abstraction.
//!
//! The `PoseModel` trait decouples the pipeline from any specific backend
//! (fixed stub pose, MoveNet via ONNX Runtime, etc.).
//!
//! `&mut self` on `predict` lets backends keep scratch buffers between
//! frames. All mutation is serialised through `ModelHandle`'s
//! `parking_lot::Mutex`.

pub mod stub;

pub use stub::StubPoseModel;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{InputElement, OnnxPoseModel, OnnxPoseModelConfig};

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frames::Frame;
use crate::keypoints::KeypointSet;

/// Contract for single-person pose estimation backends.
pub trait PoseModel: Send + 'static {
    /// One-time warm-up: load weights and run a dummy inference. Called once
    /// before the first frame.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Predict 17 keypoints for the person in `frame`.
    ///
    /// Coordinates are normalized to the frame, `(y, x, confidence)`.
    fn predict(&mut self, frame: &Frame) -> Result<KeypointSet>;
}

/// Thread-safe reference-counted handle to any `PoseModel` implementor.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn PoseModel>>);

impl ModelHandle {
    /// Wrap any `PoseModel` in a `ModelHandle`.
    pub fn new<M: PoseModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

/// Published MoveNet single-pose variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// 192×192 input. Fast, less accurate.
    #[default]
    Lightning,
    /// 256×256 input. Slower, more accurate.
    Thunder,
}

impl ModelVariant {
    /// Square input edge length in pixels.
    pub fn input_size(self) -> u32 {
        match self {
            ModelVariant::Lightning => 192,
            ModelVariant::Thunder => 256,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ModelVariant::Lightning => "movenet_lightning.onnx",
            ModelVariant::Thunder => "movenet_thunder.onnx",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelVariant::Lightning => "lightning",
            ModelVariant::Thunder => "thunder",
        }
    }

    /// Parse a user-supplied variant name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lightning" | "movenet_lightning" => Some(ModelVariant::Lightning),
            "thunder" | "movenet_thunder" => Some(ModelVariant::Thunder),
            _ => None,
        }
    }

    /// Default model path under the platform models directory.
    pub fn default_model_path(self) -> PathBuf {
        default_models_dir().join(self.file_name())
    }
}

/// Platform models directory. Model download is out of scope; users place
/// the exported `.onnx` files here.
pub fn default_models_dir() -> PathBuf {
    crate::default_data_dir().join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_input_sizes() {
        assert_eq!(ModelVariant::Lightning.input_size(), 192);
        assert_eq!(ModelVariant::Thunder.input_size(), 256);
    }

    #[test]
    fn variant_parse_is_case_insensitive_and_strict() {
        assert_eq!(ModelVariant::parse(" Thunder "), Some(ModelVariant::Thunder));
        assert_eq!(ModelVariant::parse("LIGHTNING"), Some(ModelVariant::Lightning));
        assert_eq!(ModelVariant::parse("blazepose"), None);
    }

    #[test]
    fn default_model_path_ends_with_file_name() {
        let path = ModelVariant::Thunder.default_model_path();
        assert!(path.ends_with("models/movenet_thunder.onnx"));
    }
}
