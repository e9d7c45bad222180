//! Application state shared by the command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use sitstraight_core::{
    thresholds::default_threshold_path, ModelHandle, PostureEngine, StubPoseModel,
};
use tracing::info;

use crate::settings::AppSettings;

/// Everything a command needs: the engine plus resolved settings and paths.
pub struct AppState {
    /// Wrapped in `Arc` so signal and event-forwarding tasks can hold it.
    pub engine: Arc<PostureEngine>,
    pub settings: AppSettings,
    /// Absolute path to `settings.json`.
    pub settings_path: PathBuf,
    /// Where thresholds are read from and written to.
    pub thresholds_path: PathBuf,
}

/// How the pose model should be built.
#[derive(Debug, Clone)]
pub struct ModelChoice {
    pub stub: bool,
    pub model_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        settings_path: PathBuf,
        thresholds_override: Option<PathBuf>,
        model: &ModelChoice,
    ) -> anyhow::Result<Self> {
        let thresholds_path = thresholds_override
            .or_else(|| settings.thresholds_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(default_threshold_path);

        let config = settings.engine_config();
        config.validate().context("invalid engine settings")?;
        let handle = build_model(&settings, model)?;

        Ok(Self {
            engine: Arc::new(PostureEngine::new(config, handle)),
            settings,
            settings_path,
            thresholds_path,
        })
    }

    pub fn diagnostics_snapshot(&self) -> AppDiagnostics {
        let pipeline = self.engine.diagnostics_snapshot();
        AppDiagnostics {
            frames_in: pipeline.frames_in,
            frames_skipped: pipeline.frames_skipped,
            violations: pipeline.violations,
            alerts_raised: pipeline.alerts_raised,
            alert_failures: pipeline.alert_failures,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDiagnostics {
    pub frames_in: usize,
    pub frames_skipped: usize,
    pub violations: usize,
    pub alerts_raised: usize,
    pub alert_failures: usize,
}

fn build_model(settings: &AppSettings, choice: &ModelChoice) -> anyhow::Result<ModelHandle> {
    if choice.stub {
        info!("using fixed-pose stub model");
        return Ok(ModelHandle::new(StubPoseModel::upright()));
    }

    let model_path = choice
        .model_path
        .clone()
        .or_else(|| settings.model_path.as_ref().map(PathBuf::from));

    #[cfg(feature = "onnx")]
    {
        use sitstraight_core::{OnnxPoseModel, OnnxPoseModelConfig};

        let mut config = OnnxPoseModelConfig::new(settings.variant());
        config.model_path = model_path;
        info!(
            variant = settings.variant().as_str(),
            path = %config.resolved_path().display(),
            "using MoveNet ONNX model"
        );
        Ok(ModelHandle::new(OnnxPoseModel::new(config)))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = model_path;
        anyhow::bail!(
            "this build has no ONNX support; rebuild with `--features onnx` or pass --stub-model"
        )
    }
}
