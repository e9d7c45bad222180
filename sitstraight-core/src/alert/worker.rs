//! Background thread that owns an [`AlertSink`] and plays alerts on request.
//!
//! The worker counts requests that have not produced a completion yet. A
//! worker with nothing in flight is joined on shutdown; one still inside
//! `AlertSink::play` is detached instead, so a hung sink never blocks the
//! caller.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use super::AlertSink;
use crate::error::{PostureError, Result};

/// Ask the worker to play one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertRequest {
    pub alert_id: u64,
}

/// Outcome of one [`AlertRequest`].
#[derive(Debug)]
pub struct AlertCompletion {
    pub alert_id: u64,
    pub result: Result<()>,
    pub elapsed: Duration,
}

pub struct AlertWorker {
    request_tx: Option<Sender<AlertRequest>>,
    completion_rx: Receiver<AlertCompletion>,
    handle: Option<JoinHandle<()>>,
    /// Requests sent whose completion has not been received.
    in_flight: usize,
}

impl AlertWorker {
    /// Move `sink` onto a dedicated thread and start serving requests.
    pub fn spawn(sink: Box<dyn AlertSink>) -> Result<Self> {
        let (request_tx, request_rx) = unbounded::<AlertRequest>();
        let (completion_tx, completion_rx) = unbounded::<AlertCompletion>();

        let handle = thread::Builder::new()
            .name("sitstraight-alert".into())
            .spawn(move || serve(sink, request_rx, completion_tx))?;

        Ok(Self {
            request_tx: Some(request_tx),
            completion_rx,
            handle: Some(handle),
            in_flight: 0,
        })
    }

    /// Queue an alert. Returns immediately.
    pub fn request(&mut self, alert_id: u64) -> Result<()> {
        self.request_tx
            .as_ref()
            .ok_or_else(|| PostureError::AlertDispatch("alert worker shut down".into()))?
            .send(AlertRequest { alert_id })
            .map_err(|_| PostureError::AlertDispatch("alert worker exited".into()))?;
        self.in_flight += 1;
        Ok(())
    }

    /// Number of requests still waiting for a completion.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Whether the worker thread is still running.
    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Next finished alert, if any. Never blocks.
    pub fn try_completion(&mut self) -> Option<AlertCompletion> {
        match self.completion_rx.try_recv() {
            Ok(done) => Some(self.received(done)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("alert worker completion channel closed");
                None
            }
        }
    }

    /// Wait up to `timeout` for the next finished alert.
    pub fn wait_completion(&mut self, timeout: Duration) -> Option<AlertCompletion> {
        let done = self.completion_rx.recv_timeout(timeout).ok()?;
        Some(self.received(done))
    }

    /// Stop accepting requests and return completions nobody has polled yet.
    ///
    /// The thread is joined only when no alert is in flight; otherwise it is
    /// detached and finishes (or hangs) on its own.
    pub fn shutdown(mut self) -> Vec<AlertCompletion> {
        let mut leftovers = Vec::new();
        while let Some(done) = self.try_completion() {
            leftovers.push(done);
        }
        self.release();
        leftovers.extend(self.completion_rx.try_iter());
        leftovers
    }

    fn received(&mut self, done: AlertCompletion) -> AlertCompletion {
        self.in_flight = self.in_flight.saturating_sub(1);
        done
    }

    fn release(&mut self) {
        self.request_tx.take();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.in_flight > 0 {
            warn!(
                in_flight = self.in_flight,
                "alert worker still playing, detaching thread"
            );
            drop(handle);
        } else if handle.join().is_err() {
            error!("alert worker thread panicked");
        }
    }
}

impl Drop for AlertWorker {
    fn drop(&mut self) {
        self.release();
    }
}

fn serve(
    mut sink: Box<dyn AlertSink>,
    requests: Receiver<AlertRequest>,
    completions: Sender<AlertCompletion>,
) {
    info!("alert worker started");
    for request in requests.iter() {
        let started = Instant::now();
        let result = sink.play().map_err(|e| match e {
            PostureError::AlertDispatch(_) => e,
            other => PostureError::AlertDispatch(other.to_string()),
        });
        let elapsed = started.elapsed();
        match &result {
            Ok(()) => debug!(alert_id = request.alert_id, ?elapsed, "alert finished"),
            Err(e) => warn!(alert_id = request.alert_id, ?elapsed, "alert sink failed: {e}"),
        }

        if completions
            .send(AlertCompletion {
                alert_id: request.alert_id,
                result,
                elapsed,
            })
            .is_err()
        {
            debug!(alert_id = request.alert_id, "completion dropped, worker abandoned");
            break;
        }
    }
    info!("alert worker stopped");
}
