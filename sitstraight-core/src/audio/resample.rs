//! Sample-rate conversion for alert clips using a rubato `FastFixedIn` resampler.
//!
//! Clips are decoded at whatever rate the WAV file was recorded at, while the
//! output device runs at its own native rate (commonly 48 kHz). `RateConverter`
//! converts on the alert worker thread, where allocation is allowed.
//!
//! When the two rates match no rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use crate::error::{PostureError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input held between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `source_rate` to `target_rate`, feeding rubato
    /// `chunk_size` input frames per call.
    ///
    /// # Errors
    /// `PostureError::AudioDevice` if either rate is zero or rubato fails to
    /// initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 || chunk_size == 0 {
            return Err(PostureError::AudioDevice(format!(
                "invalid resampler setup: {source_rate} Hz -> {target_rate} Hz, chunk {chunk_size}"
            )));
        }
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| PostureError::AudioDevice(format!("resampler init: {e}")))?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        debug!(source_rate, target_rate, chunk_size, "clip resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Convert `samples`, returning whatever full chunks produced (may be empty).
    /// The remainder is kept for the next call or for [`finish`](Self::finish).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// Flush the buffered tail, zero-padded to a full chunk.
    pub fn finish(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            self.input_buf.clear();
            return Vec::new();
        }
        let pad = self.chunk_size - self.input_buf.len();
        self.process(&vec![0.0; pad])
    }

    /// Convert a whole clip in one go.
    pub fn convert_all(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut out = self.process(samples);
        out.extend(self.finish());
        out
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rates_pass_samples_through() {
        let mut rc = RateConverter::new(48_000, 48_000, 1024).expect("converter");
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..300).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.convert_all(&samples), samples);
    }

    #[test]
    fn upsampling_22k_to_44k_roughly_doubles_length() {
        let mut rc = RateConverter::new(22_050, 44_100, 1024).expect("converter");
        assert!(!rc.is_passthrough());
        let out = rc.convert_all(&vec![0.0f32; 4096]);
        let expected = 8192isize;
        assert!(
            (out.len() as isize - expected).unsigned_abs() <= 64,
            "output len={} expected≈{}",
            out.len(),
            expected
        );
    }

    #[test]
    fn short_input_is_held_until_finish() {
        let mut rc = RateConverter::new(44_100, 48_000, 1024).expect("converter");
        assert!(rc.process(&vec![0.0f32; 500]).is_empty());
        assert!(!rc.finish().is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            RateConverter::new(0, 48_000, 1024),
            Err(PostureError::AudioDevice(_))
        ));
    }
}
