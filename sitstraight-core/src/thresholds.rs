//! Calibrated per-channel thresholds and their on-disk form.
//!
//! The file is a flat JSON object with exactly one numeric entry per
//! channel, keyed by channel name:
//!
//! ```json
//! {"RIGHT_EAR": 101.5, "LEFT_EAR": 99.0, "RIGHT_NOSE": 140.2,
//!  "LEFT_NOSE": 138.7, "RIGHT_EYE": 121.0, "LEFT_EYE": 119.4}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::distance::{Channel, CHANNEL_COUNT};
use crate::error::{PostureError, Result};

/// Default file name for the persisted thresholds.
pub const THRESHOLD_FILE_NAME: &str = "thresholds.json";

/// One threshold per channel. Immutable once built; a new calibration
/// produces a new set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSet([f64; CHANNEL_COUNT]);

impl ThresholdSet {
    pub fn new(values: [f64; CHANNEL_COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, channel: Channel) -> f64 {
        self.0[channel.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        Channel::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

impl Serialize for ThresholdSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CHANNEL_COUNT))?;
        for (channel, value) in self.iter() {
            map.serialize_entry(channel.name(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ThresholdSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = HashMap::<String, f64>::deserialize(deserializer)?;

        if let Some(unknown) = raw.keys().find(|k| Channel::from_name(k).is_none()) {
            return Err(D::Error::custom(format!("unknown channel key `{unknown}`")));
        }

        let mut values = [0.0; CHANNEL_COUNT];
        for channel in Channel::ALL {
            let value = raw
                .get(channel.name())
                .copied()
                .ok_or_else(|| D::Error::custom(format!("missing channel key `{channel}`")))?;
            if !value.is_finite() {
                return Err(D::Error::custom(format!(
                    "threshold for `{channel}` is not finite"
                )));
            }
            values[channel.index()] = value;
        }
        Ok(Self(values))
    }
}

/// Platform default location of the threshold file.
pub fn default_threshold_path() -> PathBuf {
    crate::default_data_dir().join(THRESHOLD_FILE_NAME)
}

/// Read the threshold file written by the last calibration run.
///
/// # Errors
/// - `PostureError::MissingThresholdFile` when the file does not exist.
/// - `PostureError::InvalidThresholdFile` when it cannot be parsed or does
///   not hold exactly the six channel keys.
pub fn load_thresholds(path: &Path) -> Result<ThresholdSet> {
    if !path.exists() {
        return Err(PostureError::MissingThresholdFile {
            path: path.to_path_buf(),
        });
    }
    let raw = fs::read_to_string(path)?;
    let set = serde_json::from_str::<ThresholdSet>(&raw).map_err(|e| {
        PostureError::InvalidThresholdFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    info!(path = %path.display(), "thresholds loaded");
    Ok(set)
}

/// Write `thresholds` to `path`, replacing any previous file.
///
/// The JSON is written to a sibling temp file first and renamed into place so
/// a failed write never leaves a partial threshold file behind.
pub fn save_thresholds(path: &Path, thresholds: &ThresholdSet) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(thresholds)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), "thresholds saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sitstraight-thresholds-{}-{name}", std::process::id()))
            .join(THRESHOLD_FILE_NAME)
    }

    fn sample_set() -> ThresholdSet {
        ThresholdSet::new([101.5, 99.0, 140.25, 138.75, 121.0, 119.5])
    }

    #[test]
    fn serializes_as_flat_map_with_channel_keys() {
        let json = serde_json::to_value(sample_set()).expect("serialize thresholds");
        let obj = json.as_object().expect("flat object");
        assert_eq!(obj.len(), 6);
        assert_eq!(json["RIGHT_EAR"], 101.5);
        assert_eq!(json["LEFT_EYE"], 119.5);
    }

    #[test]
    fn rejects_missing_channel() {
        let raw = r#"{"RIGHT_EAR":1,"LEFT_EAR":1,"RIGHT_NOSE":1,"LEFT_NOSE":1,"RIGHT_EYE":1}"#;
        let err = serde_json::from_str::<ThresholdSet>(raw).unwrap_err();
        assert!(err.to_string().contains("LEFT_EYE"), "{err}");
    }

    #[test]
    fn rejects_unknown_channel() {
        let raw = r#"{"RIGHT_EAR":1,"LEFT_EAR":1,"RIGHT_NOSE":1,"LEFT_NOSE":1,"RIGHT_EYE":1,"LEFT_EYE":1,"dists_right_ear":1}"#;
        assert!(serde_json::from_str::<ThresholdSet>(raw).is_err());
    }

    #[test]
    fn save_then_load_overwrites_previous_file() {
        let path = temp_path("overwrite");
        save_thresholds(&path, &ThresholdSet::new([1.0; CHANNEL_COUNT])).expect("first save");
        save_thresholds(&path, &sample_set()).expect("second save");

        let loaded = load_thresholds(&path).expect("load thresholds");
        assert_eq!(loaded, sample_set());
        assert!(!path.with_extension("json.tmp").exists());

        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }

    #[test]
    fn load_missing_file_asks_for_calibration() {
        let path = temp_path("missing");
        let err = load_thresholds(&path).unwrap_err();
        assert!(matches!(err, PostureError::MissingThresholdFile { .. }));
        assert!(err.to_string().contains("run calibration first"));
    }

    #[test]
    fn load_garbage_is_invalid_not_missing() {
        let path = temp_path("garbage");
        fs::create_dir_all(path.parent().expect("parent dir")).expect("create dir");
        fs::write(&path, "not json").expect("write garbage");

        let err = load_thresholds(&path).unwrap_err();
        assert!(matches!(err, PostureError::InvalidThresholdFile { .. }));

        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }
}
