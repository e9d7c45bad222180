//! Blocking frame loops.
//!
//! ## Detection stages (per frame)
//!
//! ```text
//! 1. FrameSource::next_frame           (ends the loop on None)
//! 2. Poll alert completions / timeout  → Detector::alert_finished
//! 3. PoseModel::predict                (frame skipped on error)
//! 4. distance::extract                 (frame skipped on invalid keypoints)
//! 5. Detector::observe(captured_at)
//! 6. Broadcast PostureSampleEvent; on alert_raised request playback
//! ```
//!
//! Calibration runs stages 1, 3 and 4, then feeds a `CalibrationSession`
//! until both labeled windows have elapsed.
//!
//! Both loops run in `spawn_blocking`, keeping the Tokio executor free.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    alert::{AlertCompletion, AlertSink, AlertWorker},
    calibration::{derive_thresholds, CalibrationPhase, CalibrationReport, CalibrationSession},
    detection::Detector,
    distance::{extract, DistanceVector},
    engine::EngineConfig,
    error::{PostureError, Result},
    frames::{Frame, FrameSource},
    inference::ModelHandle,
    ipc::events::{
        AlertEvent, AlertPhase, CalibrationProgressEvent, EngineStatus, EngineStatusEvent,
        PostureSampleEvent,
    },
    thresholds::ThresholdSet,
};

pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub frames_skipped: AtomicUsize,
    pub violations: AtomicUsize,
    pub alerts_raised: AtomicUsize,
    pub alert_failures: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            frames_in: AtomicUsize::new(0),
            frames_skipped: AtomicUsize::new(0),
            violations: AtomicUsize::new(0),
            alerts_raised: AtomicUsize::new(0),
            alert_failures: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.frames_skipped.store(0, Ordering::Relaxed);
        self.violations.store(0, Ordering::Relaxed);
        self.alerts_raised.store(0, Ordering::Relaxed);
        self.alert_failures.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            alert_failures: self.alert_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_skipped: usize,
    pub violations: usize,
    pub alerts_raised: usize,
    pub alert_failures: usize,
}

/// Shared state handed to either loop, so the spawn closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub model: ModelHandle,
    pub source: Box<dyn FrameSource>,
    pub running: Arc<AtomicBool>,
    pub sample_tx: broadcast::Sender<PostureSampleEvent>,
    pub alert_tx: broadcast::Sender<AlertEvent>,
    pub calibration_tx: broadcast::Sender<CalibrationProgressEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

impl PipelineContext {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Pull the next frame, honouring the running flag.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.running.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let frame = self.source.next_frame()?;
        if frame.is_some() {
            self.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);
        }
        Ok(frame)
    }

    /// Keypoints → distances for one frame, or `None` if the frame is skipped.
    fn measure(&self, frame: &Frame) -> Option<DistanceVector> {
        let measured = self
            .model
            .0
            .lock()
            .predict(frame)
            .and_then(|keypoints| extract(&keypoints, frame.dims()));
        match measured {
            Ok(v) => Some(v),
            Err(e) => {
                self.diagnostics.frames_skipped.fetch_add(1, Ordering::Relaxed);
                warn!("frame skipped: {e}");
                None
            }
        }
    }

    fn emit_alert(&self, alert_id: u64, phase: AlertPhase, detail: Option<String>) {
        let _ = self.alert_tx.send(AlertEvent {
            seq: self.next_seq(),
            alert_id,
            phase,
            detail,
        });
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

/// Poll interval while waiting for the last alert at the end of a session.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Alert currently owned by the worker.
struct PendingAlert {
    alert_id: u64,
    requested_at: Instant,
}

/// Run detection until the source ends or `ctx.running` becomes false.
///
/// `sink` is kept as a template: each alert worker plays on a copy of it, and
/// a worker whose alert expired is abandoned and replaced by a fresh one.
pub fn run_detection(
    mut ctx: PipelineContext,
    thresholds: ThresholdSet,
    sink: Box<dyn AlertSink>,
) -> Result<()> {
    let span = info_span!(
        "detection",
        time_threshold_s = ctx.config.detection.time_threshold.as_secs_f64()
    );
    let _guard = span.enter();
    info!("detection loop started");

    let mut worker = AlertWorker::spawn(sink.boxed_clone())?;
    let mut detector = Detector::new(thresholds, ctx.config.detection.clone());
    let mut pending: Option<PendingAlert> = None;
    let mut next_alert_id = 0u64;

    let result = loop {
        let frame = match ctx.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        while let Some(done) = worker.try_completion() {
            settle_alert(&ctx, &mut detector, &mut pending, done);
        }
        if expire_alert(&ctx, &mut detector, &mut pending) {
            match AlertWorker::spawn(sink.boxed_clone()) {
                Ok(fresh) => {
                    let stuck = std::mem::replace(&mut worker, fresh);
                    let _ = stuck.shutdown();
                }
                Err(e) => break Err(e),
            }
        }

        let Some(v) = ctx.measure(&frame) else {
            continue;
        };

        let outcome = detector.observe(&v, frame.captured_at);
        if outcome.violated {
            ctx.diagnostics.violations.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            violated = outcome.violated,
            accumulated_ms = outcome.accumulated.as_millis() as u64,
            state = ?outcome.state,
            "frame observed"
        );

        let _ = ctx.sample_tx.send(PostureSampleEvent {
            seq: ctx.next_seq(),
            distances: *v.values(),
            violated: outcome.violated,
            violating: outcome.violating.clone(),
            accumulated_secs: outcome.accumulated.as_secs_f64(),
            state: outcome.state,
        });

        if outcome.alert_raised {
            let alert_id = next_alert_id;
            next_alert_id += 1;
            ctx.diagnostics.alerts_raised.fetch_add(1, Ordering::Relaxed);
            info!(alert_id, channels = ?outcome.violating, "posture alert raised");
            ctx.emit_alert(alert_id, AlertPhase::Raised, None);

            match worker.request(alert_id) {
                Ok(()) => {
                    pending = Some(PendingAlert {
                        alert_id,
                        requested_at: Instant::now(),
                    });
                }
                Err(e) => {
                    ctx.diagnostics.alert_failures.fetch_add(1, Ordering::Relaxed);
                    error!(alert_id, "alert dispatch failed: {e}");
                    detector.alert_finished();
                    ctx.emit_alert(alert_id, AlertPhase::Failed, Some(e.to_string()));
                }
            }
        }
    };

    finish_alerts(&ctx, worker, &mut detector, &mut pending);
    ctx.running.store(false, Ordering::SeqCst);

    match &result {
        Ok(()) => {
            ctx.set_status(EngineStatus::Stopped, None);
            info!("detection loop stopped");
        }
        Err(e) => {
            ctx.set_status(EngineStatus::Error, Some(e.to_string()));
            error!("detection loop failed: {e}");
        }
    }
    result
}

/// Apply one completion from the alert worker.
fn settle_alert(
    ctx: &PipelineContext,
    detector: &mut Detector,
    pending: &mut Option<PendingAlert>,
    done: AlertCompletion,
) {
    let is_current = pending
        .as_ref()
        .is_some_and(|p| p.alert_id == done.alert_id);
    if !is_current {
        debug!(alert_id = done.alert_id, "ignoring completion of an expired alert");
        return;
    }
    *pending = None;
    detector.alert_finished();

    match done.result {
        Ok(()) => {
            info!(
                alert_id = done.alert_id,
                elapsed_ms = done.elapsed.as_millis() as u64,
                "alert completed"
            );
            ctx.emit_alert(done.alert_id, AlertPhase::Completed, None);
        }
        Err(e) => {
            ctx.diagnostics.alert_failures.fetch_add(1, Ordering::Relaxed);
            warn!(alert_id = done.alert_id, "alert playback failed, resuming monitoring: {e}");
            ctx.emit_alert(done.alert_id, AlertPhase::Failed, Some(e.to_string()));
        }
    }
}

/// Give up on an alert the sink has not finished within the configured
/// window. Returns `true` when the alert was abandoned.
fn expire_alert(
    ctx: &PipelineContext,
    detector: &mut Detector,
    pending: &mut Option<PendingAlert>,
) -> bool {
    let Some(timeout) = ctx.config.alert_completion_timeout else {
        return false;
    };
    let Some(alert) = pending.as_ref() else {
        return false;
    };
    if alert.requested_at.elapsed() < timeout {
        return false;
    }

    let alert_id = alert.alert_id;
    *pending = None;
    detector.alert_finished();
    ctx.diagnostics.alert_failures.fetch_add(1, Ordering::Relaxed);
    warn!(alert_id, ?timeout, "alert completion timed out, resuming monitoring");
    ctx.emit_alert(
        alert_id,
        AlertPhase::Failed,
        Some(format!("no completion within {timeout:?}")),
    );
    true
}

/// Settle the alert still playing when the frame loop ended, then release
/// the worker.
///
/// A session that ran out of frames waits for the last completion, bounded
/// by `alert_completion_timeout` when one is set. A stop request ends the
/// wait; the playing alert is left to finish on the detached worker.
fn finish_alerts(
    ctx: &PipelineContext,
    mut worker: AlertWorker,
    detector: &mut Detector,
    pending: &mut Option<PendingAlert>,
) {
    if let Some(alert) = pending.as_ref() {
        let deadline = ctx
            .config
            .alert_completion_timeout
            .map(|t| alert.requested_at + t);
        loop {
            let slice = deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .map_or(STOP_POLL, |left| left.min(STOP_POLL));
            if let Some(done) = worker.wait_completion(slice) {
                settle_alert(ctx, detector, pending, done);
                break;
            }
            let timed_out = deadline.is_some_and(|d| Instant::now() >= d);
            if timed_out || !worker.is_alive() || !ctx.running.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    let stopped = !ctx.running.load(Ordering::SeqCst);
    if let Some(alert) = pending.take() {
        if stopped {
            info!(alert_id = alert.alert_id, "session stopped while an alert was playing");
        } else {
            let detail = match ctx.config.alert_completion_timeout {
                Some(timeout) => format!("no completion within {timeout:?}"),
                None => "alert worker exited without reporting".to_string(),
            };
            detector.alert_finished();
            ctx.diagnostics.alert_failures.fetch_add(1, Ordering::Relaxed);
            warn!(alert_id = alert.alert_id, "last alert unresolved: {detail}");
            ctx.emit_alert(alert.alert_id, AlertPhase::Failed, Some(detail));
        }
    }

    for done in worker.shutdown() {
        settle_alert(ctx, detector, pending, done);
    }
}

/// Run a calibration session until both windows elapse, the source ends, or
/// `ctx.running` becomes false, then derive thresholds from what was seen.
///
/// # Errors
/// `PostureError::InsufficientCalibrationData` when the session ended before
/// every channel had good and bad samples.
pub fn run_calibration(mut ctx: PipelineContext) -> Result<CalibrationReport> {
    let span = info_span!(
        "calibration",
        phase_s = ctx.config.calibration.phase_duration.as_secs_f64()
    );
    let _guard = span.enter();
    info!("calibration started: hold a good posture");

    let mut session = CalibrationSession::new(ctx.config.calibration.phase_duration);
    let mut last_phase = CalibrationPhase::Good;

    let collected: Result<()> = loop {
        let frame = match ctx.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        let Some(v) = ctx.measure(&frame) else {
            continue;
        };

        let progress = session.observe(&v, frame.captured_at);
        if progress.phase != last_phase {
            match progress.phase {
                CalibrationPhase::Bad => info!(
                    good_frames = progress.good_frames,
                    "good window done: now hold a bad posture"
                ),
                CalibrationPhase::Complete => info!(
                    bad_frames = progress.bad_frames,
                    "bad window done"
                ),
                CalibrationPhase::Good => {}
            }
            last_phase = progress.phase;
        }

        let _ = ctx.calibration_tx.send(CalibrationProgressEvent {
            phase: progress.phase,
            remaining_secs: progress.remaining.as_secs_f64(),
            good_frames: progress.good_frames,
            bad_frames: progress.bad_frames,
        });

        if progress.phase == CalibrationPhase::Complete {
            break Ok(());
        }
    };

    ctx.running.store(false, Ordering::SeqCst);

    let result = collected.and_then(|()| {
        let report = derive_thresholds(&session.into_sample(), &ctx.config.calibration)?;
        warn_on_polarity_conflicts(&ctx.config, &report);
        Ok(report)
    });

    match &result {
        Ok(_) => ctx.set_status(EngineStatus::Stopped, None),
        Err(e) => {
            error!("calibration failed: {e}");
            ctx.set_status(EngineStatus::Error, Some(e.to_string()));
        }
    }
    result
}

fn warn_on_polarity_conflicts(config: &EngineConfig, report: &CalibrationReport) {
    for channel in report.polarity_conflicts(&config.detection) {
        let i = channel.index();
        warn!(
            %channel,
            polarity = ?config.detection.polarity_of(channel),
            trimmed_good = report.trimmed_good[i],
            trimmed_bad = report.trimmed_bad[i],
            "calibrated means disagree with configured polarity; check labels"
        );
    }
}

/// Map a loop failure to the error surfaced by the engine when the blocking
/// task itself died.
pub(crate) fn task_died(e: tokio::task::JoinError) -> PostureError {
    PostureError::Other(anyhow::anyhow!("pipeline task died unexpectedly: {e}"))
}
