//! MoveNet single-pose backend via the `ort` crate.
//!
//! Targets the TF Hub MoveNet SinglePose exports converted to ONNX:
//!
//! | Variant   | Input                  | Output              |
//! |-----------|------------------------|---------------------|
//! | Lightning | `[1,192,192,3]` (i32)  | `[1,1,17,3]` (f32)  |
//! | Thunder   | `[1,256,256,3]` (i32)  | `[1,1,17,3]` (f32)  |
//!
//! Output rows are `(y, x, score)` normalized to the square model input.
//!
//! ## Preprocessing
//!
//! Frames are resized with padding: scaled to fit the square input while
//! keeping aspect ratio, then centred on a black canvas. Predicted
//! coordinates are mapped back out of the padded square so callers receive
//! coordinates normalized to the original frame.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
#[cfg(target_os = "windows")]
use ort::ep;
use tracing::{debug, info, warn};

use crate::{
    error::{PostureError, Result},
    frames::Frame,
    inference::{ModelVariant, PoseModel},
    keypoints::{Keypoint, KeypointSet, KEYPOINT_COUNT},
};

/// Element type the exported model expects for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputElement {
    /// 0–255 pixel values as `i32` (TF Hub export).
    #[default]
    Int32,
    /// 0–255 pixel values as `f32`.
    Float32,
}

/// Configuration for [`OnnxPoseModel`].
#[derive(Debug, Clone)]
pub struct OnnxPoseModelConfig {
    pub variant: ModelVariant,
    /// Override for the `.onnx` path. `None` uses the variant default under
    /// the models directory.
    pub model_path: Option<PathBuf>,
    pub input_element: InputElement,
}

impl OnnxPoseModelConfig {
    pub fn new(variant: ModelVariant) -> Self {
        Self {
            variant,
            model_path: None,
            input_element: InputElement::default(),
        }
    }

    pub fn resolved_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| self.variant.default_model_path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrtExecutionPreference {
    Auto,
    Cpu,
    DirectML,
}

fn ort_execution_preference() -> OrtExecutionPreference {
    match std::env::var("SITSTRAIGHT_ORT_EP")
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "cpu" => OrtExecutionPreference::Cpu,
        "dml" | "directml" => OrtExecutionPreference::DirectML,
        _ => OrtExecutionPreference::Auto,
    }
}

fn create_session(model_path: &Path) -> Result<Session> {
    let pref = ort_execution_preference();
    let logical_cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let intra_threads = std::env::var("SITSTRAIGHT_ORT_INTRA_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(logical_cores.clamp(1, 4))
        .clamp(1, 16);

    #[allow(unused_mut)]
    let mut builder = SessionBuilder::new()
        .map_err(|e| PostureError::OnnxSession(e.to_string()))?
        .with_intra_threads(intra_threads)
        .map_err(|e| PostureError::OnnxSession(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(|e| PostureError::OnnxSession(e.to_string()))?;
    info!(intra_threads, logical_cores, ?pref, "ONNX session configured");

    #[cfg(target_os = "windows")]
    {
        builder = match pref {
            OrtExecutionPreference::Cpu => builder
                .with_execution_providers([ep::CPU::default().build()])
                .map_err(|e| PostureError::OnnxSession(e.to_string()))?,
            OrtExecutionPreference::DirectML | OrtExecutionPreference::Auto => builder
                .with_execution_providers([
                    ep::DirectML::default()
                        .with_device_id(0)
                        .build()
                        .fail_silently(),
                    ep::CPU::default().build(),
                ])
                .map_err(|e| PostureError::OnnxSession(e.to_string()))?,
        };
    }

    #[cfg(not(target_os = "windows"))]
    {
        if pref == OrtExecutionPreference::DirectML {
            warn!("SITSTRAIGHT_ORT_EP=directml requested on non-Windows host; using CPU EP");
        }
    }

    builder
        .commit_from_file(model_path)
        .map_err(|e| PostureError::OnnxSession(e.to_string()))
}

/// Padding geometry of one resize-with-pad pass, in model input pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    size: f32,
    scaled_h: f32,
    scaled_w: f32,
    pad_top: f32,
    pad_left: f32,
}

impl Letterbox {
    fn for_frame(height: u32, width: u32, size: u32) -> Self {
        let scale = size as f32 / height.max(width).max(1) as f32;
        let scaled_h = (height as f32 * scale).round().max(1.0);
        let scaled_w = (width as f32 * scale).round().max(1.0);
        Self {
            size: size as f32,
            scaled_h,
            scaled_w,
            pad_top: ((size as f32 - scaled_h) / 2.0).floor(),
            pad_left: ((size as f32 - scaled_w) / 2.0).floor(),
        }
    }

    /// Map a keypoint normalized to the padded square back to the frame.
    fn unpad(&self, kp: Keypoint) -> Keypoint {
        Keypoint::new(
            (kp.y * self.size - self.pad_top) / self.scaled_h,
            (kp.x * self.size - self.pad_left) / self.scaled_w,
            kp.confidence,
        )
    }
}

fn resize_with_pad(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let lb = Letterbox::for_frame(image.height(), image.width(), size);
    let resized = imageops::resize(
        image,
        lb.scaled_w as u32,
        lb.scaled_h as u32,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::new(size, size);
    imageops::overlay(&mut canvas, &resized, lb.pad_left as i64, lb.pad_top as i64);
    (canvas, lb)
}

pub struct OnnxPoseModel {
    config: OnnxPoseModelConfig,
    session: Option<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxPoseModel {
    pub fn new(config: OnnxPoseModelConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: String::new(),
            output_name: String::new(),
        }
    }

    fn load(&mut self) -> Result<()> {
        let path = self.config.resolved_path();
        if !path.exists() {
            return Err(PostureError::ModelNotFound { path });
        }

        let session = create_session(&path)?;
        self.input_name = session
            .inputs()
            .first()
            .map(|outlet| outlet.name().to_string())
            .ok_or_else(|| PostureError::OnnxSession("pose model has no inputs".into()))?;
        self.output_name = session
            .outputs()
            .first()
            .map(|outlet| outlet.name().to_string())
            .ok_or_else(|| PostureError::OnnxSession("pose model has no outputs".into()))?;

        info!(
            path = %path.display(),
            variant = self.config.variant.as_str(),
            input = %self.input_name,
            output = %self.output_name,
            "pose model loaded"
        );
        self.session = Some(session);
        Ok(())
    }

    fn input_value(&self, canvas: &RgbImage) -> Result<SessionInputValue<'static>> {
        let size = canvas.width() as usize;
        let shape = (1, size, size, 3);
        let raw = canvas.as_raw();
        let value: SessionInputValue<'static> = match self.config.input_element {
            InputElement::Int32 => {
                let arr = Array4::<i32>::from_shape_vec(
                    shape,
                    raw.iter().map(|&p| p as i32).collect(),
                )
                .map_err(|e| PostureError::Inference(e.to_string()))?;
                Value::from_array(arr)
                    .map_err(|e: ort::Error| PostureError::OnnxSession(e.to_string()))?
                    .into()
            }
            InputElement::Float32 => {
                let arr = Array4::<f32>::from_shape_vec(
                    shape,
                    raw.iter().map(|&p| p as f32).collect(),
                )
                .map_err(|e| PostureError::Inference(e.to_string()))?;
                Value::from_array(arr)
                    .map_err(|e: ort::Error| PostureError::OnnxSession(e.to_string()))?
                    .into()
            }
        };
        Ok(value)
    }
}

impl PoseModel for OnnxPoseModel {
    fn warm_up(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.load()?;
        }
        let size = self.config.variant.input_size();
        let dummy = Frame::blank(size, size);
        self.predict(&dummy)?;
        debug!("pose model warm-up inference complete");
        Ok(())
    }

    fn predict(&mut self, frame: &Frame) -> Result<KeypointSet> {
        if self.session.is_none() {
            self.load()?;
        }

        let (canvas, letterbox) = resize_with_pad(&frame.image, self.config.variant.input_size());
        let input = self.input_value(&canvas)?;
        let input_name = self.input_name.clone();
        let output_name = self.output_name.clone();

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PostureError::Inference("pose session not loaded".into()))?;
        let outputs = session
            .run(vec![(input_name, input)])
            .map_err(|e| PostureError::OnnxSession(e.to_string()))?;

        let output = outputs
            .get(output_name.as_str())
            .unwrap_or(&outputs[0]);
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PostureError::OnnxSession(e.to_string()))?;

        if data.len() < KEYPOINT_COUNT * 3 {
            return Err(PostureError::Inference(format!(
                "pose output has {} values, expected {}",
                data.len(),
                KEYPOINT_COUNT * 3
            )));
        }

        let raw = KeypointSet::from_triples(&data[..KEYPOINT_COUNT * 3]);
        let points = raw.points().iter().map(|kp| letterbox.unpad(*kp)).collect();
        Ok(KeypointSet::new(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn letterbox_pads_landscape_frame_vertically() {
        let lb = Letterbox::for_frame(480, 640, 192);
        assert_relative_eq!(lb.scaled_w, 192.0);
        assert_relative_eq!(lb.scaled_h, 144.0);
        assert_relative_eq!(lb.pad_top, 24.0);
        assert_relative_eq!(lb.pad_left, 0.0);
    }

    #[test]
    fn unpad_maps_canvas_centre_to_frame_centre() {
        let lb = Letterbox::for_frame(480, 640, 192);
        let kp = lb.unpad(Keypoint::new(0.5, 0.5, 0.7));
        assert_relative_eq!(kp.y, 0.5, epsilon = 1e-6);
        assert_relative_eq!(kp.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(kp.confidence, 0.7);
    }

    #[test]
    fn unpad_maps_top_padding_edge_to_zero() {
        let lb = Letterbox::for_frame(480, 640, 192);
        let kp = lb.unpad(Keypoint::new(24.0 / 192.0, 0.0, 1.0));
        assert_relative_eq!(kp.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn resize_with_pad_produces_square_canvas() {
        let (canvas, _) = resize_with_pad(&RgbImage::new(640, 480), 256);
        assert_eq!(canvas.dimensions(), (256, 256));
    }

    #[test]
    fn missing_model_file_is_reported() {
        let mut config = OnnxPoseModelConfig::new(ModelVariant::Lightning);
        config.model_path = Some(PathBuf::from("/nonexistent/movenet.onnx"));
        let mut model = OnnxPoseModel::new(config);
        assert!(matches!(
            model.warm_up(),
            Err(PostureError::ModelNotFound { .. })
        ));
    }
}
