//! Wall-clock driven good/bad labeling for one calibration run.
//!
//! ```text
//! t=0 ──── phase_duration ──── 2×phase_duration ──►
//!   │   Good (record good)  │  Bad (record bad)  │ Complete
//! ```
//!
//! Elapsed time is measured from the first observed frame, so model warm-up
//! or camera start latency does not eat into the good phase.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::CalibrationSample;
use crate::distance::DistanceVector;

/// Which labeled window a calibration frame falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationPhase {
    /// User is asked to sit correctly.
    Good,
    /// User is asked to slouch.
    Bad,
    /// Both windows elapsed; no more frames are recorded.
    Complete,
}

/// Snapshot returned after every observed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProgress {
    pub phase: CalibrationPhase,
    /// Time left in the current phase (zero once complete).
    pub remaining: Duration,
    pub good_frames: usize,
    pub bad_frames: usize,
}

pub struct CalibrationSession {
    phase_duration: Duration,
    started_at: Option<Instant>,
    sample: CalibrationSample,
}

impl CalibrationSession {
    pub fn new(phase_duration: Duration) -> Self {
        Self {
            phase_duration,
            started_at: None,
            sample: CalibrationSample::new(),
        }
    }

    /// Phase for a frame captured at `now`.
    pub fn phase_at(&self, now: Instant) -> CalibrationPhase {
        let elapsed = self
            .started_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();
        if elapsed < self.phase_duration {
            CalibrationPhase::Good
        } else if elapsed < self.phase_duration * 2 {
            CalibrationPhase::Bad
        } else {
            CalibrationPhase::Complete
        }
    }

    /// Record one frame's distances into the window `now` falls into.
    pub fn observe(&mut self, v: &DistanceVector, now: Instant) -> CalibrationProgress {
        let started_at = *self.started_at.get_or_insert(now);
        let phase = self.phase_at(now);
        match phase {
            CalibrationPhase::Good => self.sample.record_good(v),
            CalibrationPhase::Bad => self.sample.record_bad(v),
            CalibrationPhase::Complete => {}
        }

        let elapsed = now.saturating_duration_since(started_at);
        let remaining = match phase {
            CalibrationPhase::Good => self.phase_duration - elapsed,
            CalibrationPhase::Bad => self.phase_duration * 2 - elapsed,
            CalibrationPhase::Complete => Duration::ZERO,
        };

        CalibrationProgress {
            phase,
            remaining,
            good_frames: self.sample.good.frames(),
            bad_frames: self.sample.bad.frames(),
        }
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        self.started_at.is_some() && self.phase_at(now) == CalibrationPhase::Complete
    }

    pub fn sample(&self) -> &CalibrationSample {
        &self.sample
    }

    /// Consume the session, handing back whatever was recorded.
    pub fn into_sample(self) -> CalibrationSample {
        self.sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Channel;

    #[test]
    fn frames_are_labeled_by_elapsed_time() {
        let t0 = Instant::now();
        let mut session = CalibrationSession::new(Duration::from_secs(3));

        let mut phases = Vec::new();
        for i in 0..8u64 {
            let v = DistanceVector::splat(i as f64);
            phases.push(session.observe(&v, t0 + Duration::from_secs(i)).phase);
        }

        use CalibrationPhase::*;
        assert_eq!(phases, vec![Good, Good, Good, Bad, Bad, Bad, Complete, Complete]);

        let sample = session.into_sample();
        assert_eq!(sample.good.channel(Channel::RightEar), &[0.0, 1.0, 2.0]);
        assert_eq!(sample.bad.channel(Channel::LeftEye), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn clock_starts_at_first_frame() {
        let t0 = Instant::now();
        let mut session = CalibrationSession::new(Duration::from_secs(10));
        let later = t0 + Duration::from_secs(25);

        let progress = session.observe(&DistanceVector::splat(1.0), later);
        assert_eq!(progress.phase, CalibrationPhase::Good);
        assert_eq!(progress.remaining, Duration::from_secs(10));
        assert_eq!(progress.good_frames, 1);
    }

    #[test]
    fn remaining_counts_down_within_bad_phase() {
        let t0 = Instant::now();
        let mut session = CalibrationSession::new(Duration::from_secs(10));
        session.observe(&DistanceVector::splat(1.0), t0);

        let progress = session.observe(&DistanceVector::splat(1.0), t0 + Duration::from_secs(14));
        assert_eq!(progress.phase, CalibrationPhase::Bad);
        assert_eq!(progress.remaining, Duration::from_secs(6));
        assert_eq!(progress.bad_frames, 1);
        assert!(!session.is_complete(t0 + Duration::from_secs(19)));
        assert!(session.is_complete(t0 + Duration::from_secs(20)));
    }

    #[test]
    fn unstarted_session_is_not_complete() {
        let session = CalibrationSession::new(Duration::from_secs(1));
        assert!(!session.is_complete(Instant::now()));
    }
}
