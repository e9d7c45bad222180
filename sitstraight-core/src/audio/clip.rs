//! Alert clip discovery and WAV decoding.

use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::buffering::AudioClip;
use crate::error::{PostureError, Result};

/// Set of `.wav` files one of which is played per alert.
#[derive(Debug, Clone)]
pub struct ClipLibrary {
    clips: Vec<PathBuf>,
}

impl ClipLibrary {
    /// Collect every `.wav` file directly inside `dir`, in name order.
    ///
    /// # Errors
    /// `PostureError::AlertDispatch` if the directory cannot be read or holds
    /// no WAV files.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut clips: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| PostureError::AlertDispatch(format!("{}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
            })
            .collect();
        clips.sort();

        if clips.is_empty() {
            return Err(PostureError::AlertDispatch(format!(
                "no .wav clips in {}",
                dir.display()
            )));
        }
        info!(dir = %dir.display(), clips = clips.len(), "alert clip library loaded");
        Ok(Self { clips })
    }

    pub fn clips(&self) -> &[PathBuf] {
        &self.clips
    }

    /// Pick one clip uniformly at random.
    pub fn choose(&self) -> &Path {
        // `open` guarantees at least one clip.
        self.clips
            .choose(&mut rand::thread_rng())
            .map(PathBuf::as_path)
            .unwrap_or_else(|| self.clips[0].as_path())
    }
}

/// Decode a WAV file to mono f32 in [-1.0, 1.0], averaging channels.
pub fn decode_wav(path: &Path) -> Result<AudioClip> {
    let mut reader = WavReader::open(path)
        .map_err(|e| PostureError::AlertDispatch(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PostureError::AlertDispatch(format!("{}: {e}", path.display())))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PostureError::AlertDispatch(format!("{}: {e}", path.display())))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        frames = samples.len(),
        "alert clip decoded"
    );
    Ok(AudioClip::new(samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sitstraight-clips-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn write_stereo_i16(path: &Path, frames: &[(i16, i16)]) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).expect("create wav");
        for (l, r) in frames {
            writer.write_sample(*l).expect("write left");
            writer.write_sample(*r).expect("write right");
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn stereo_int_clip_is_mixed_to_mono() {
        let dir = scratch_dir("decode");
        let path = dir.join("ding.wav");
        write_stereo_i16(&path, &[(16_384, 0), (-16_384, -16_384)]);

        let clip = decode_wav(&path).expect("decode");
        assert_eq!(clip.sample_rate, 22_050);
        assert_eq!(clip.samples.len(), 2);
        assert!((clip.samples[0] - 0.25).abs() < 1e-4);
        assert!((clip.samples[1] + 0.5).abs() < 1e-4);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn library_only_lists_wav_files() {
        let dir = scratch_dir("library");
        write_stereo_i16(&dir.join("b.wav"), &[(0, 0)]);
        write_stereo_i16(&dir.join("a.WAV"), &[(0, 0)]);
        fs::write(dir.join("readme.txt"), "x").expect("write txt");

        let library = ClipLibrary::open(&dir).expect("open library");
        assert_eq!(library.clips().len(), 2);
        assert!(library.clips().contains(&library.choose().to_path_buf()));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_library_is_an_error() {
        let dir = scratch_dir("empty");
        assert!(matches!(
            ClipLibrary::open(&dir),
            Err(PostureError::AlertDispatch(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
