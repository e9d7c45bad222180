//! Posture detection state machine.
//!
//! ## States
//!
//! ```text
//!            violated for ≥ time_threshold
//! Monitoring ─────────────────────────────► Alerting
//!     ▲                                         │
//!     └──────── alert_finished() ◄──────────────┘
//! ```
//!
//! ## Per-frame rules
//!
//! 1. A frame is *violated* when any channel is on the wrong side of its
//!    threshold (`v <= T` for the default higher-is-better polarity).
//! 2. Monitoring + not violated → accumulated violation time resets to zero.
//! 3. Monitoring + violated → the exact wall-clock gap since the previous
//!    frame is credited. Reaching `time_threshold` raises one alert, moves to
//!    Alerting and zeroes the accumulator.
//! 4. Alerting → nothing accumulates until the alert sink reports completion.
//!    Completion returns to Monitoring with a fresh tolerance window.
//! 5. `last_sample_time` advances on every frame.
//!
//! Frames must be fed in capture order from a single call site.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::{Channel, DistanceVector, CHANNEL_COUNT};
use crate::error::{PostureError, Result};
use crate::thresholds::ThresholdSet;

/// Which side of the threshold counts as good posture for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Distance shrinks when slouching; `value <= threshold` violates.
    #[default]
    HigherIsBetter,
    /// Distance grows when slouching; `value >= threshold` violates.
    LowerIsBetter,
}

impl Polarity {
    pub fn violates(self, value: f64, threshold: f64) -> bool {
        match self {
            Polarity::HigherIsBetter => value <= threshold,
            Polarity::LowerIsBetter => value >= threshold,
        }
    }

    /// Whether trimmed good/bad means agree with this polarity.
    pub fn agrees_with(self, trimmed_good: f64, trimmed_bad: f64) -> bool {
        match self {
            Polarity::HigherIsBetter => trimmed_good >= trimmed_bad,
            Polarity::LowerIsBetter => trimmed_good <= trimmed_bad,
        }
    }
}

/// Detection tunables.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Continuous violation needed before an alert fires. Default: 15 s.
    pub time_threshold: Duration,
    /// Comparison direction per channel. Default: all higher-is-better.
    pub polarity: [Polarity; CHANNEL_COUNT],
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            time_threshold: Duration::from_secs(15),
            polarity: [Polarity::HigherIsBetter; CHANNEL_COUNT],
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.time_threshold.is_zero() {
            return Err(PostureError::InvalidConfig(
                "time_threshold must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn polarity_of(&self, channel: Channel) -> Polarity {
        self.polarity[channel.index()]
    }
}

/// Coarse detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorState {
    Monitoring,
    Alerting,
}

/// Mutable bookkeeping owned by [`Detector`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionState {
    pub accumulated_violation_time: Duration,
    pub is_alert_active: bool,
    /// `None` until the first frame, and again right after an alert clears.
    pub last_sample_time: Option<Instant>,
}

/// Result of feeding one frame to the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub violated: bool,
    /// Channels on the wrong side of their threshold.
    pub violating: Vec<Channel>,
    /// Accumulated violation time after this frame.
    pub accumulated: Duration,
    pub state: DetectorState,
    /// `true` on the one frame that raised an alert.
    pub alert_raised: bool,
}

pub struct Detector {
    thresholds: ThresholdSet,
    config: DetectionConfig,
    state: DetectionState,
}

impl Detector {
    pub fn new(thresholds: ThresholdSet, config: DetectionConfig) -> Self {
        Self {
            thresholds,
            config,
            state: DetectionState::default(),
        }
    }

    /// Channels of `v` that violate their threshold.
    pub fn violating_channels(&self, v: &DistanceVector) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|&c| {
                self.config
                    .polarity_of(c)
                    .violates(v.get(c), self.thresholds.get(c))
            })
            .collect()
    }

    /// Advance the state machine with the distances of a frame captured at
    /// `now`.
    pub fn observe(&mut self, v: &DistanceVector, now: Instant) -> FrameOutcome {
        let delta = self
            .state
            .last_sample_time
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or_default();
        self.state.last_sample_time = Some(now);

        let violating = self.violating_channels(v);
        let violated = !violating.is_empty();
        let mut alert_raised = false;

        if !self.state.is_alert_active {
            if violated {
                self.state.accumulated_violation_time += delta;
                if self.state.accumulated_violation_time >= self.config.time_threshold {
                    debug!(
                        accumulated_ms = self.state.accumulated_violation_time.as_millis() as u64,
                        channels = ?violating,
                        "violation window exceeded, alerting"
                    );
                    self.state.is_alert_active = true;
                    self.state.accumulated_violation_time = Duration::ZERO;
                    alert_raised = true;
                }
            } else {
                self.state.accumulated_violation_time = Duration::ZERO;
            }
        }

        FrameOutcome {
            violated,
            violating,
            accumulated: self.state.accumulated_violation_time,
            state: self.current_state(),
            alert_raised,
        }
    }

    /// The alert sink finished (or failed) playing. Returns to monitoring
    /// with a fresh tolerance window regardless of current posture.
    ///
    /// Returns `false` if no alert was active.
    pub fn alert_finished(&mut self) -> bool {
        let was_active = self.state.is_alert_active;
        self.state.is_alert_active = false;
        self.state.accumulated_violation_time = Duration::ZERO;
        self.state.last_sample_time = None;
        was_active
    }

    pub fn current_state(&self) -> DetectorState {
        if self.state.is_alert_active {
            DetectorState::Alerting
        } else {
            DetectorState::Monitoring
        }
    }

    pub fn detection_state(&self) -> &DetectionState {
        &self.state
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn detector_at(threshold: f64) -> Detector {
        Detector::new(
            ThresholdSet::new([threshold; CHANNEL_COUNT]),
            DetectionConfig::default(),
        )
    }

    /// Feed `values` (all channels equal) one second apart; return the indices
    /// that raised an alert.
    fn run(detector: &mut Detector, start: Instant, values: &[f64]) -> Vec<usize> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| {
                let now = start + SECOND * i as u32;
                detector
                    .observe(&DistanceVector::splat(v), now)
                    .alert_raised
                    .then_some(i)
            })
            .collect()
    }

    #[test]
    fn starts_monitoring_with_empty_state() {
        let detector = detector_at(100.0);
        assert_eq!(detector.current_state(), DetectorState::Monitoring);
        assert_eq!(detector.detection_state(), &DetectionState::default());
    }

    #[test]
    fn value_equal_to_threshold_is_a_violation() {
        let detector = detector_at(100.0);
        assert_eq!(
            detector.violating_channels(&DistanceVector::splat(100.0)).len(),
            CHANNEL_COUNT
        );
        assert!(detector
            .violating_channels(&DistanceVector::splat(100.5))
            .is_empty());
    }

    #[test]
    fn any_single_channel_violation_counts() {
        let detector = detector_at(100.0);
        let v = DistanceVector::splat(150.0).with(Channel::LeftNose, 40.0);
        assert_eq!(detector.violating_channels(&v), vec![Channel::LeftNose]);
    }

    #[test]
    fn sixteen_samples_spanning_window_alert_on_last() {
        let mut detector = detector_at(100.0);
        let t0 = Instant::now();

        let alerts = run(&mut detector, t0, &[50.0; 15]);
        assert!(alerts.is_empty(), "alerted early at {alerts:?}");
        assert_eq!(detector.detection_state().accumulated_violation_time, SECOND * 14);

        let outcome = detector.observe(&DistanceVector::splat(50.0), t0 + SECOND * 15);
        assert!(outcome.alert_raised);
        assert_eq!(outcome.state, DetectorState::Alerting);
        assert_eq!(outcome.accumulated, Duration::ZERO);
    }

    #[test]
    fn passing_sample_resets_without_partial_credit() {
        let mut detector = detector_at(100.0);
        let t0 = Instant::now();

        let mut values = vec![50.0; 10];
        values.push(150.0);
        values.extend([50.0; 10]);
        let alerts = run(&mut detector, t0, &values);

        assert!(alerts.is_empty());
        // 10 s credited since the passing frame at index 10.
        assert_eq!(detector.detection_state().accumulated_violation_time, SECOND * 10);
    }

    #[test]
    fn reset_example_alerts_fifteen_seconds_after_passing_sample() {
        let mut thresholds = [0.0; CHANNEL_COUNT];
        thresholds[Channel::RightEar.index()] = 100.0;
        let mut detector = Detector::new(ThresholdSet::new(thresholds), DetectionConfig::default());
        let t0 = Instant::now();

        let mut series = vec![90.0, 90.0, 90.0, 150.0];
        series.extend([90.0; 20]);

        let mut alerts = Vec::new();
        for (i, ear) in series.iter().enumerate() {
            let v = DistanceVector::splat(50.0).with(Channel::RightEar, *ear);
            let outcome = detector.observe(&v, t0 + SECOND * i as u32);
            if i == 3 {
                assert!(!outcome.violated);
                assert_eq!(outcome.accumulated, Duration::ZERO);
            }
            if outcome.alert_raised {
                alerts.push(i);
            }
        }

        assert_eq!(alerts, vec![18]);
    }

    #[test]
    fn alerting_debounces_further_violations() {
        let mut detector = detector_at(100.0);
        let t0 = Instant::now();

        let alerts = run(&mut detector, t0, &[50.0; 60]);
        assert_eq!(alerts, vec![15]);
        assert_eq!(detector.current_state(), DetectorState::Alerting);
        assert_eq!(detector.detection_state().accumulated_violation_time, Duration::ZERO);
    }

    #[test]
    fn finished_alert_requires_full_fresh_window() {
        let mut detector = detector_at(100.0);
        let t0 = Instant::now();
        assert_eq!(run(&mut detector, t0, &[50.0; 16]), vec![15]);

        // Playback ran for a while; posture stayed bad the whole time.
        assert!(detector.alert_finished());
        assert_eq!(detector.current_state(), DetectorState::Monitoring);

        let resume = t0 + SECOND * 40;
        let alerts = run(&mut detector, resume, &[50.0; 15]);
        assert!(alerts.is_empty(), "carried over violation time: {alerts:?}");
        let outcome = detector.observe(&DistanceVector::splat(50.0), resume + SECOND * 15);
        assert!(outcome.alert_raised);
    }

    #[test]
    fn alert_finished_without_alert_is_noop() {
        let mut detector = detector_at(100.0);
        assert!(!detector.alert_finished());
        assert_eq!(detector.current_state(), DetectorState::Monitoring);
    }

    #[test]
    fn irregular_frame_gaps_are_credited_exactly() {
        let mut detector = detector_at(100.0);
        let t0 = Instant::now();
        let bad = DistanceVector::splat(10.0);

        detector.observe(&bad, t0);
        detector.observe(&bad, t0 + Duration::from_millis(250));
        // Dropped frames: 9.75 s gap.
        let out = detector.observe(&bad, t0 + Duration::from_secs(10));
        assert_eq!(out.accumulated, Duration::from_secs(10));
        assert!(!out.alert_raised);

        let out = detector.observe(&bad, t0 + Duration::from_millis(15_000));
        assert!(out.alert_raised);
    }

    #[test]
    fn last_sample_time_advances_on_passing_frames() {
        let mut detector = detector_at(100.0);
        let t0 = Instant::now();
        detector.observe(&DistanceVector::splat(500.0), t0 + SECOND * 3);
        assert_eq!(detector.detection_state().last_sample_time, Some(t0 + SECOND * 3));
    }

    #[test]
    fn lower_is_better_polarity_flips_comparison() {
        let mut config = DetectionConfig::default();
        config.polarity[Channel::RightEye.index()] = Polarity::LowerIsBetter;
        let detector = Detector::new(ThresholdSet::new([100.0; CHANNEL_COUNT]), config);

        let v = DistanceVector::splat(150.0);
        assert_eq!(detector.violating_channels(&v), vec![Channel::RightEye]);

        let v = DistanceVector::splat(150.0).with(Channel::RightEye, 80.0);
        assert!(detector.violating_channels(&v).is_empty());
    }

    #[test]
    fn polarity_agreement() {
        assert!(Polarity::HigherIsBetter.agrees_with(120.0, 80.0));
        assert!(!Polarity::HigherIsBetter.agrees_with(80.0, 120.0));
        assert!(Polarity::LowerIsBetter.agrees_with(80.0, 120.0));
    }

    #[test]
    fn zero_time_threshold_is_invalid() {
        let config = DetectionConfig {
            time_threshold: Duration::ZERO,
            ..DetectionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
