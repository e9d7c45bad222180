//! Alert clip playback via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate, block on a lock, or perform I/O. The callback only
//! pops samples from an SPSC ring buffer consumer and writes silence when the
//! ring runs dry.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioPlayback` must therefore be created and dropped on the same
//! thread. The alert worker opens one per alert on its own thread.

pub mod clip;
pub mod device;
pub mod resample;

use std::time::Duration;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};
use tracing::{debug, warn};

#[cfg(feature = "audio-cpal")]
use tracing::{error, info};

use crate::{
    buffering::{AudioClip, Observer, PlaybackProducer, Producer},
    error::{PostureError, Result},
};
use resample::RateConverter;

/// Input frames per rubato call when converting clips.
const RESAMPLE_CHUNK: usize = 1024;

/// Poll interval while waiting for the callback to drain the ring.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Handle to an open output stream.
///
/// **Not `Send`**: create and drop it on the same OS thread.
pub struct AudioPlayback {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    producer: PlaybackProducer,
    /// Native output rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioPlayback {
    /// Open an output device by preferred name, otherwise the default output
    /// device, otherwise the first available one.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(preferred_device_name: Option<&str>) -> Result<Self> {
        use crate::buffering::{create_playback_ring, Consumer};

        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.output_devices() {
                Ok(mut devices) => {
                    selected = devices.find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred output device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => warn!("failed to list output devices while resolving preference: {e}"),
            }
        }

        let device = match selected.or_else(|| host.default_output_device()) {
            Some(device) => device,
            None => host
                .output_devices()
                .map_err(|e| PostureError::AudioDevice(e.to_string()))?
                .next()
                .ok_or_else(|| PostureError::AudioDevice("no output device available".into()))?,
        };

        let supported = device
            .default_output_config()
            .map_err(|e| PostureError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate,
            channels,
            "opening output device"
        );

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, mut consumer) = create_playback_ring();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _info| {
                    for frame in data.chunks_mut(channels) {
                        let s = consumer.try_pop().unwrap_or(0.0);
                        frame.fill(s);
                    }
                },
                |err| error!("audio output stream error: {err}"),
                None,
            ),
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _info| {
                    for frame in data.chunks_mut(channels) {
                        let s = consumer.try_pop().unwrap_or(0.0).clamp(-1.0, 1.0);
                        frame.fill((s * i16::MAX as f32) as i16);
                    }
                },
                |err| error!("audio output stream error: {err}"),
                None,
            ),
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _info| {
                    for frame in data.chunks_mut(channels) {
                        let s = consumer.try_pop().unwrap_or(0.0).clamp(-1.0, 1.0);
                        frame.fill(((s + 1.0) * 0.5 * u16::MAX as f32) as u16);
                    }
                },
                |err| error!("audio output stream error: {err}"),
                None,
            ),
            fmt => {
                return Err(PostureError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| PostureError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PostureError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
        })
    }

    /// Open the system default output device.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default() -> Result<Self> {
        Self::open_with_preference(None)
    }

    /// Play `clip` to completion, resampling to the device rate first.
    ///
    /// Blocks the calling thread until the output callback has drained every
    /// sample.
    pub fn play(&mut self, clip: &AudioClip) -> Result<()> {
        let mut converter = RateConverter::new(clip.sample_rate, self.sample_rate, RESAMPLE_CHUNK)?;
        let samples = converter.convert_all(&clip.samples);
        debug!(
            clip_rate = clip.sample_rate,
            device_rate = self.sample_rate,
            samples = samples.len(),
            "playing alert clip"
        );

        let mut offset = 0;
        while offset < samples.len() {
            let written = self.producer.push_slice(&samples[offset..]);
            offset += written;
            if written == 0 {
                std::thread::sleep(DRAIN_POLL);
            }
        }
        while !self.producer.is_empty() {
            std::thread::sleep(DRAIN_POLL);
        }
        Ok(())
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioPlayback {
    pub fn open_with_preference(_preferred_device_name: Option<&str>) -> Result<Self> {
        warn!("alert playback requested but audio support is not compiled in");
        Err(PostureError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default() -> Result<Self> {
        Self::open_with_preference(None)
    }
}
