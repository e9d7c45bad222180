//! Subcommand handlers.
//!
//! Each handler owns one user-facing operation and returns `anyhow::Result`
//! so failures print with their full context chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use sitstraight_core::{
    audio::device::list_output_devices, load_thresholds, save_thresholds, AlertSink,
    ClipAlertSink, FrameSource, ImageSequenceSource, LogAlertSink, Pacing, PostureEngine,
    PostureError,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::settings::save_settings;
use crate::state::AppState;

/// Where `calibrate` and `detect` read frames from.
#[derive(Debug, Clone)]
pub struct FrameInput {
    /// Directory of frames to replay.
    pub frames: Option<PathBuf>,
    /// Capture device index for live capture.
    pub camera: Option<i32>,
    /// Replay rate; ignored for live capture.
    pub fps: Option<f64>,
    pub realtime: bool,
}

impl FrameInput {
    fn open(&self, default_fps: f64) -> anyhow::Result<Box<dyn FrameSource>> {
        if let Some(index) = self.camera {
            return open_camera(index);
        }
        let Some(frames) = &self.frames else {
            anyhow::bail!("no frame input; pass --frames <dir> or --camera <index>");
        };
        let fps = self.fps.unwrap_or(default_fps);
        let pacing = if self.realtime {
            Pacing::RealTime { fps }
        } else {
            Pacing::Simulated { fps }
        };
        let source = ImageSequenceSource::open(frames, pacing)
            .with_context(|| format!("cannot replay frames from {}", frames.display()))?;
        Ok(Box::new(source))
    }
}

#[cfg(feature = "camera")]
fn open_camera(index: i32) -> anyhow::Result<Box<dyn FrameSource>> {
    let source = sitstraight_core::CameraSource::open(index)
        .with_context(|| format!("cannot open camera {index}"))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "camera"))]
fn open_camera(index: i32) -> anyhow::Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "camera {index} requested but this build has no camera support; rebuild with `--features camera`"
    )
}

/// Run a calibration session and write the threshold file.
pub async fn calibrate(
    state: &AppState,
    input: &FrameInput,
    report_path: Option<&Path>,
    json_events: bool,
) -> anyhow::Result<()> {
    let source = input.open(state.settings.fps)?;
    state.engine.warm_up().context("pose model warm-up failed")?;

    if json_events {
        forward_events(state.engine.subscribe_calibration());
    }
    stop_on_ctrl_c(Arc::clone(&state.engine));

    let report = state.engine.calibrate(source).await?;

    save_thresholds(&state.thresholds_path, &report.thresholds)?;
    info!(path = %state.thresholds_path.display(), "thresholds saved");
    for (channel, value) in report.thresholds.iter() {
        println!("{channel:<10} {value:>8.2}");
    }

    if let Some(path) = report_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("cannot write report to {}", path.display()))?;
        info!(path = %path.display(), "calibration report written");
    }
    Ok(())
}

/// Load thresholds and monitor posture until the frames run out or Ctrl-C.
pub async fn detect(
    state: &AppState,
    input: &FrameInput,
    audio_dir: Option<PathBuf>,
    json_events: bool,
) -> anyhow::Result<()> {
    let thresholds = match load_thresholds(&state.thresholds_path) {
        Ok(t) => t,
        Err(e @ PostureError::MissingThresholdFile { .. }) => {
            return Err(anyhow::Error::new(e)
                .context("no calibration found; run `sitstraight calibrate` first"));
        }
        Err(e) => return Err(e.into()),
    };
    let source = input.open(state.settings.fps)?;
    let sink = build_sink(state, audio_dir)?;

    state.engine.warm_up().context("pose model warm-up failed")?;

    if json_events {
        forward_events(state.engine.subscribe_samples());
        forward_events(state.engine.subscribe_alerts());
    }
    stop_on_ctrl_c(Arc::clone(&state.engine));

    state
        .engine
        .start_detection(source, thresholds, sink)?;
    state.engine.wait_detection().await?;

    let diag = state.diagnostics_snapshot();
    info!(
        frames_in = diag.frames_in,
        frames_skipped = diag.frames_skipped,
        violations = diag.violations,
        alerts_raised = diag.alerts_raised,
        alert_failures = diag.alert_failures,
        "detection finished"
    );
    Ok(())
}

/// Print the saved threshold file.
pub fn show_thresholds(state: &AppState) -> anyhow::Result<()> {
    let thresholds = load_thresholds(&state.thresholds_path)?;
    println!("{}", serde_json::to_string_pretty(&thresholds)?);
    Ok(())
}

/// List audio output devices usable for alerts.
pub fn list_devices() -> anyhow::Result<()> {
    let devices = list_output_devices();
    if devices.is_empty() {
        println!("no audio output devices found");
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        println!("{marker} {}", device.name);
    }
    Ok(())
}

/// Print the effective settings, optionally writing them back normalized.
pub fn show_settings(state: &AppState, save: bool) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&state.settings)?);
    if save {
        save_settings(&state.settings_path, &state.settings)
            .with_context(|| format!("cannot write {}", state.settings_path.display()))?;
        info!(path = %state.settings_path.display(), "settings saved");
    }
    Ok(())
}

fn build_sink(state: &AppState, audio_dir: Option<PathBuf>) -> anyhow::Result<Box<dyn AlertSink>> {
    let dir = audio_dir.or_else(|| state.settings.audio_dir.as_ref().map(PathBuf::from));
    match dir {
        Some(dir) => {
            let sink = ClipAlertSink::open(&dir)
                .with_context(|| format!("cannot load alert clips from {}", dir.display()))?
                .with_output_device(state.settings.output_device.clone());
            Ok(Box::new(sink))
        }
        None => {
            warn!("no alert clip directory configured; alerts will only be logged");
            Ok(Box::new(LogAlertSink::new()))
        }
    }
}

/// Print each event as one JSON line on stdout.
fn forward_events<E>(mut rx: broadcast::Receiver<E>)
where
    E: Serialize + Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("event serialization failed: {e}"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn stop_on_ctrl_c(engine: Arc<PostureEngine>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            let _ = engine.stop();
        }
    });
}
