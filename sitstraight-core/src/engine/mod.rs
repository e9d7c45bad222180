//! `PostureEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! PostureEngine::new()
//!     └─► warm_up()                    → model loaded, status = WarmingUp → Idle
//!         ├─► calibrate(source).await  → status = Calibrating → Stopped, report returned
//!         └─► start_detection(..)      → loop spawned, status = Monitoring
//!             └─► stop()               → running=false, status = Stopped
//! ```
//!
//! Only one session (calibration or detection) runs at a time. Starting a
//! second returns `AlreadyRunning`; stopping an idle engine returns
//! `NotRunning`.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    alert::AlertSink,
    calibration::{CalibrationConfig, CalibrationReport},
    detection::DetectionConfig,
    error::{PostureError, Result},
    frames::FrameSource,
    inference::ModelHandle,
    ipc::events::{
        AlertEvent, CalibrationProgressEvent, EngineStatus, EngineStatusEvent, PostureSampleEvent,
    },
    thresholds::ThresholdSet,
};

pub use pipeline::DiagnosticsSnapshot;

/// Broadcast channel capacity for every event stream.
const BROADCAST_CAP: usize = 256;

/// Configuration for `PostureEngine`.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub calibration: CalibrationConfig,
    pub detection: DetectionConfig,
    /// Give up waiting for the alert sink after this long and resume
    /// monitoring. `None` waits for the sink indefinitely.
    pub alert_completion_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.calibration.validate()?;
        self.detection.validate()
    }
}

/// The top-level engine handle.
///
/// `PostureEngine` is `Send + Sync`; wrap it in `Arc` to share it between a
/// host's command handlers and event-forwarding tasks.
pub struct PostureEngine {
    config: EngineConfig,
    model: ModelHandle,
    /// `true` while a calibration or detection loop is active.
    running: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    sample_tx: broadcast::Sender<PostureSampleEvent>,
    alert_tx: broadcast::Sender<AlertEvent>,
    calibration_tx: broadcast::Sender<CalibrationProgressEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    /// Join handle of the running detection loop.
    detection: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl PostureEngine {
    /// Create an engine. Nothing runs until `calibrate` or `start_detection`.
    pub fn new(config: EngineConfig, model: ModelHandle) -> Self {
        let (sample_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (alert_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (calibration_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            model,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            sample_tx,
            alert_tx,
            calibration_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            detection: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load the pose model and run one dummy inference.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up pose model");
        if let Err(e) = self.model.0.lock().warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_status(EngineStatus::Idle, None);
        info!("pose model ready");
        Ok(())
    }

    /// Run one calibration session over `source` and derive thresholds.
    ///
    /// Resolves once both labeled windows have elapsed, the source ends, or
    /// `stop()` is called. Persisting the thresholds is up to the caller.
    ///
    /// # Errors
    /// - `PostureError::AlreadyRunning` if a session is active.
    /// - `PostureError::InsufficientCalibrationData` if the session ended
    ///   before both windows collected samples.
    pub async fn calibrate(&self, source: Box<dyn FrameSource>) -> Result<CalibrationReport> {
        self.begin(EngineStatus::Calibrating)?;
        let ctx = self.context(source);
        tokio::task::spawn_blocking(move || pipeline::run_calibration(ctx))
            .await
            .map_err(|e| self.task_failed(e))?
    }

    /// Start the detection loop in the background and return immediately.
    ///
    /// `sink` is moved onto the alert worker thread for the whole session.
    ///
    /// # Errors
    /// - `PostureError::AlreadyRunning` if a session is active.
    /// - `PostureError::InvalidConfig` if the detection config is invalid.
    pub fn start_detection(
        &self,
        source: Box<dyn FrameSource>,
        thresholds: ThresholdSet,
        sink: Box<dyn AlertSink>,
    ) -> Result<()> {
        self.config.detection.validate()?;
        self.begin(EngineStatus::Monitoring)?;

        let ctx = self.context(source);
        let handle =
            tokio::task::spawn_blocking(move || pipeline::run_detection(ctx, thresholds, sink));
        *self.detection.lock() = Some(handle);
        info!("engine started, monitoring posture");
        Ok(())
    }

    /// Wait for the detection loop to finish (source exhausted or `stop()`).
    ///
    /// Returns `Ok(())` immediately if no detection loop was started.
    pub async fn wait_detection(&self) -> Result<()> {
        let handle = self.detection.lock().take();
        match handle {
            Some(handle) => handle.await.map_err(|e| self.task_failed(e))?,
            None => Ok(()),
        }
    }

    /// Ask the running session to stop after the current frame.
    ///
    /// # Errors
    /// `PostureError::NotRunning` if nothing is running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(PostureError::NotRunning);
        }
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<PostureSampleEvent> {
        self.sample_tx.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertEvent> {
        self.alert_tx.subscribe()
    }

    pub fn subscribe_calibration(&self) -> broadcast::Receiver<CalibrationProgressEvent> {
        self.calibration_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Counters for the current (or last) session.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn begin(&self, status: EngineStatus) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PostureError::AlreadyRunning);
        }
        self.diagnostics.reset();
        self.set_status(status, None);
        Ok(())
    }

    fn context(&self, source: Box<dyn FrameSource>) -> pipeline::PipelineContext {
        pipeline::PipelineContext {
            config: self.config.clone(),
            model: self.model.clone(),
            source,
            running: Arc::clone(&self.running),
            sample_tx: self.sample_tx.clone(),
            alert_tx: self.alert_tx.clone(),
            calibration_tx: self.calibration_tx.clone(),
            status_tx: self.status_tx.clone(),
            status: Arc::clone(&self.status),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        }
    }

    fn task_failed(&self, e: tokio::task::JoinError) -> PostureError {
        self.running.store(false, Ordering::SeqCst);
        let err = pipeline::task_died(e);
        self.set_status(EngineStatus::Error, Some(err.to_string()));
        err
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}
