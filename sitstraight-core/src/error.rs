use std::path::PathBuf;

use thiserror::Error;

use crate::distance::Channel;

/// All errors produced by sitstraight-core.
#[derive(Debug, Error)]
pub enum PostureError {
    #[error("invalid keypoints: {0}")]
    InvalidKeypoints(String),

    #[error("insufficient calibration data: no {label} samples for channel {channel}")]
    InsufficientCalibrationData {
        channel: Channel,
        label: &'static str,
    },

    #[error("threshold file not found: {path}; run calibration first")]
    MissingThresholdFile { path: PathBuf },

    #[error("threshold file {path} is invalid: {reason}")]
    InvalidThresholdFile { path: PathBuf, reason: String },

    #[error("alert dispatch failed: {0}")]
    AlertDispatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("frame source error: {0}")]
    FrameSource(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PostureError>;
