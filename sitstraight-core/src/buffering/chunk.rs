//! Decoded alert clip held in memory before playback.

/// Mono PCM samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_rate() {
        let clip = AudioClip::new(vec![0.0; 22_050], 44_100);
        assert!((clip.duration_secs() - 0.5).abs() < 1e-9);
        assert!(!clip.is_empty());
    }

    #[test]
    fn zero_rate_clip_has_no_duration() {
        assert_eq!(AudioClip::new(vec![0.0; 10], 0).duration_secs(), 0.0);
    }
}
