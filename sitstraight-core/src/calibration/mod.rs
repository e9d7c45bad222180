//! Threshold calibration.
//!
//! ## Algorithm
//!
//! 1. Collect distance vectors while the user holds good posture, then while
//!    they hold bad posture ([`CalibrationSample`]).
//! 2. Per channel, take the trimmed mean of each labeled sample, dropping
//!    `trim_percent` of the sorted values from each tail.
//! 3. `threshold = bad + jump_percent × (good − bad)`.
//!
//! No iteration: one deterministic pass per channel.

pub mod session;

pub use session::{CalibrationPhase, CalibrationProgress, CalibrationSession};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::DetectionConfig;
use crate::distance::{Channel, DistanceVector, CHANNEL_COUNT};
use crate::error::{PostureError, Result};
use crate::thresholds::ThresholdSet;

/// Tunables for a calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Fraction cut from each tail before averaging. Must be in `[0, 0.5)`.
    /// Default: 0.1.
    pub trim_percent: f64,
    /// Position of the threshold between the bad (0.0) and good (1.0)
    /// trimmed means. Must be in `[0, 1]`. Default: 0.5.
    pub jump_percent: f64,
    /// Length of each labeled phase. Default: 30 s.
    pub phase_duration: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            trim_percent: 0.1,
            jump_percent: 0.5,
            phase_duration: Duration::from_secs(30),
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.trim_percent) {
            return Err(PostureError::InvalidConfig(format!(
                "trim_percent must be in [0, 0.5), got {}",
                self.trim_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.jump_percent) {
            return Err(PostureError::InvalidConfig(format!(
                "jump_percent must be in [0, 1], got {}",
                self.jump_percent
            )));
        }
        if self.phase_duration.is_zero() {
            return Err(PostureError::InvalidConfig(
                "phase_duration must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-channel value sequences for one labeled window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSamples([Vec<f64>; CHANNEL_COUNT]);

impl ChannelSamples {
    pub fn push(&mut self, v: &DistanceVector) {
        for (channel, value) in v.iter() {
            self.0[channel.index()].push(value);
        }
    }

    pub fn channel(&self, channel: Channel) -> &[f64] {
        &self.0[channel.index()]
    }

    /// Number of frames recorded (channels are filled in lockstep).
    pub fn frames(&self) -> usize {
        self.0.iter().map(Vec::len).min().unwrap_or(0)
    }
}

/// Raw good/bad samples gathered during a calibration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub good: ChannelSamples,
    pub bad: ChannelSamples,
}

impl CalibrationSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_good(&mut self, v: &DistanceVector) {
        self.good.push(v);
    }

    pub fn record_bad(&mut self, v: &DistanceVector) {
        self.bad.push(v);
    }
}

/// Everything a calibration run derived, kept for diagnostics.
///
/// Only `thresholds` is persisted as the threshold file; the rest can be
/// dumped as JSON for plotting the good/bad clusters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    pub thresholds: ThresholdSet,
    pub trimmed_good: [f64; CHANNEL_COUNT],
    pub trimmed_bad: [f64; CHANNEL_COUNT],
    pub trim_percent: f64,
    pub jump_percent: f64,
    pub sample: CalibrationSample,
}

impl CalibrationReport {
    /// Channels whose trimmed means contradict the configured polarity,
    /// e.g. good posture measuring shorter on a higher-is-better channel.
    pub fn polarity_conflicts(&self, detection: &DetectionConfig) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|&c| {
                let i = c.index();
                !detection
                    .polarity_of(c)
                    .agrees_with(self.trimmed_good[i], self.trimmed_bad[i])
            })
            .collect()
    }
}

/// Mean of `values` after discarding `trim_percent` of the sorted values
/// from each end.
///
/// The number cut per tail is `floor(trim_percent × n)`. Returns `None` for
/// an empty slice.
pub fn trimmed_mean(values: &[f64], trim_percent: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let cut = ((trim_percent * n as f64).floor() as usize).min((n - 1) / 2);

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let kept = &sorted[cut..n - cut];
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Interpolate a threshold between the bad and good trimmed means.
pub fn interpolate_threshold(trimmed_good: f64, trimmed_bad: f64, jump_percent: f64) -> f64 {
    trimmed_bad + jump_percent * (trimmed_good - trimmed_bad)
}

/// Derive one threshold per channel from a finished calibration sample.
///
/// # Errors
/// - `PostureError::InvalidConfig` if the config is out of range.
/// - `PostureError::InsufficientCalibrationData` if any channel has no good
///   or no bad samples.
pub fn derive_thresholds(
    sample: &CalibrationSample,
    config: &CalibrationConfig,
) -> Result<CalibrationReport> {
    config.validate()?;

    let mut trimmed_good = [0.0; CHANNEL_COUNT];
    let mut trimmed_bad = [0.0; CHANNEL_COUNT];
    let mut thresholds = [0.0; CHANNEL_COUNT];

    for channel in Channel::ALL {
        let good = trimmed_mean(sample.good.channel(channel), config.trim_percent).ok_or(
            PostureError::InsufficientCalibrationData {
                channel,
                label: "good",
            },
        )?;
        let bad = trimmed_mean(sample.bad.channel(channel), config.trim_percent).ok_or(
            PostureError::InsufficientCalibrationData {
                channel,
                label: "bad",
            },
        )?;

        let i = channel.index();
        trimmed_good[i] = good;
        trimmed_bad[i] = bad;
        thresholds[i] = interpolate_threshold(good, bad, config.jump_percent);
    }

    info!(
        good_frames = sample.good.frames(),
        bad_frames = sample.bad.frames(),
        trim_percent = config.trim_percent,
        jump_percent = config.jump_percent,
        "calibration thresholds derived"
    );

    Ok(CalibrationReport {
        thresholds: ThresholdSet::new(thresholds),
        trimmed_good,
        trimmed_bad,
        trim_percent: config.trim_percent,
        jump_percent: config.jump_percent,
        sample: sample.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Polarity;
    use approx::assert_relative_eq;

    fn sample_with(good: &[f64], bad: &[f64]) -> CalibrationSample {
        let mut sample = CalibrationSample::new();
        for g in good {
            sample.record_good(&DistanceVector::splat(*g));
        }
        for b in bad {
            sample.record_bad(&DistanceVector::splat(*b));
        }
        sample
    }

    #[test]
    fn trimmed_mean_drops_each_tail() {
        // 10 values, 10 % trim → drop one from each end.
        let values = [1000.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, -1000.0];
        let mean = trimmed_mean(&values, 0.1).expect("non-empty");
        assert_relative_eq!(mean, 4.5);
    }

    #[test]
    fn trimmed_mean_rounds_cut_down() {
        // 9 values, 10 % → floor(0.9) = 0 cut; plain mean.
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 90.0];
        assert_relative_eq!(trimmed_mean(&values, 0.1).expect("non-empty"), 14.0);
    }

    #[test]
    fn trimmed_mean_of_constant_channel_ignores_trim() {
        let values = vec![42.5; 37];
        for trim in [0.0, 0.05, 0.1, 0.25, 0.49] {
            assert_relative_eq!(trimmed_mean(&values, trim).expect("non-empty"), 42.5);
        }
    }

    #[test]
    fn trimmed_mean_single_value_survives_any_trim() {
        assert_relative_eq!(trimmed_mean(&[7.0], 0.49).expect("non-empty"), 7.0);
    }

    #[test]
    fn trimmed_mean_empty_is_none() {
        assert!(trimmed_mean(&[], 0.1).is_none());
    }

    #[test]
    fn default_threshold_is_midpoint() {
        let sample = sample_with(&[120.0; 20], &[80.0; 20]);
        let report = derive_thresholds(&sample, &CalibrationConfig::default()).expect("derive");
        for (_, t) in report.thresholds.iter() {
            assert_relative_eq!(t, 100.0);
        }
        assert!(report
            .polarity_conflicts(&DetectionConfig::default())
            .is_empty());
    }

    #[test]
    fn outlier_frames_do_not_move_threshold() {
        let mut good = vec![120.0; 18];
        good.push(0.0); // keypoint briefly vanished
        good.push(900.0);
        let sample = sample_with(&good, &[80.0; 20]);
        let report = derive_thresholds(&sample, &CalibrationConfig::default()).expect("derive");
        assert_relative_eq!(report.trimmed_good[0], 120.0);
        assert_relative_eq!(report.thresholds.get(Channel::RightEar), 100.0);
    }

    #[test]
    fn threshold_lies_between_trimmed_means() {
        let good: Vec<f64> = (0..40).map(|i| 110.0 + (i % 7) as f64).collect();
        let bad: Vec<f64> = (0..40).map(|i| 70.0 + (i % 5) as f64 * 3.0).collect();
        let sample = sample_with(&good, &bad);

        for step in 0..=10 {
            let config = CalibrationConfig {
                jump_percent: step as f64 / 10.0,
                ..CalibrationConfig::default()
            };
            let report = derive_thresholds(&sample, &config).expect("derive");
            for channel in Channel::ALL {
                let i = channel.index();
                let lo = report.trimmed_good[i].min(report.trimmed_bad[i]);
                let hi = report.trimmed_good[i].max(report.trimmed_bad[i]);
                let t = report.thresholds.get(channel);
                assert!(lo <= t && t <= hi, "{channel}: {t} outside [{lo}, {hi}]");
            }
        }
    }

    #[test]
    fn jump_percent_biases_toward_good_cluster() {
        let sample = sample_with(&[120.0; 10], &[80.0; 10]);
        let config = CalibrationConfig {
            jump_percent: 0.75,
            ..CalibrationConfig::default()
        };
        let report = derive_thresholds(&sample, &config).expect("derive");
        assert_relative_eq!(report.thresholds.get(Channel::LeftEye), 110.0);
    }

    #[test]
    fn reversed_labels_still_produce_threshold() {
        let sample = sample_with(&[80.0; 10], &[120.0; 10]);
        let report = derive_thresholds(&sample, &CalibrationConfig::default()).expect("derive");
        assert_relative_eq!(report.thresholds.get(Channel::RightNose), 100.0);
        assert_eq!(
            report.polarity_conflicts(&DetectionConfig::default()).len(),
            CHANNEL_COUNT
        );
    }

    #[test]
    fn lower_is_better_channels_do_not_conflict_when_good_is_shorter() {
        let sample = sample_with(&[80.0; 10], &[120.0; 10]);
        let report = derive_thresholds(&sample, &CalibrationConfig::default()).expect("derive");
        let mut detection = DetectionConfig::default();
        detection.polarity[Channel::RightEar.index()] = Polarity::LowerIsBetter;

        let conflicts = report.polarity_conflicts(&detection);
        assert_eq!(conflicts.len(), CHANNEL_COUNT - 1);
        assert!(!conflicts.contains(&Channel::RightEar));
    }

    #[test]
    fn empty_good_is_insufficient_even_with_full_bad() {
        let sample = sample_with(&[], &[80.0; 50]);
        let err = derive_thresholds(&sample, &CalibrationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PostureError::InsufficientCalibrationData {
                label: "good",
                ..
            }
        ));
    }

    #[test]
    fn empty_bad_is_insufficient() {
        let sample = sample_with(&[120.0; 50], &[]);
        let err = derive_thresholds(&sample, &CalibrationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PostureError::InsufficientCalibrationData { label: "bad", .. }
        ));
    }

    #[test]
    fn out_of_range_config_is_rejected() {
        let sample = sample_with(&[120.0; 10], &[80.0; 10]);
        let config = CalibrationConfig {
            trim_percent: 0.5,
            ..CalibrationConfig::default()
        };
        assert!(matches!(
            derive_thresholds(&sample, &config),
            Err(PostureError::InvalidConfig(_))
        ));
    }
}
