//! Persistent application settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitstraight_core::distance::CHANNEL_COUNT;
use sitstraight_core::{
    CalibrationConfig, Channel, DetectionConfig, EngineConfig, ModelVariant, Polarity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub model_variant: String,
    pub model_path: Option<String>,
    pub thresholds_path: Option<String>,
    pub audio_dir: Option<String>,
    pub output_device: Option<String>,
    pub fps: f64,
    pub time_threshold_secs: f64,
    pub calibration_phase_secs: f64,
    pub trim_percent: f64,
    pub jump_percent: f64,
    pub alert_timeout_secs: Option<f64>,
    /// Channel names (e.g. `"RIGHT_EAR"`) whose distance shrinking means
    /// good posture.
    pub lower_is_better_channels: Vec<String>,
    pub ort_ep: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_variant: "lightning".into(),
            model_path: None,
            thresholds_path: None,
            audio_dir: None,
            output_device: None,
            fps: 10.0,
            time_threshold_secs: 15.0,
            calibration_phase_secs: 30.0,
            trim_percent: 0.1,
            jump_percent: 0.5,
            alert_timeout_secs: None,
            lower_is_better_channels: Vec::new(),
            ort_ep: "auto".into(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.model_variant = normalize_model_variant(&self.model_variant);
        self.ort_ep = normalize_ort_ep(&self.ort_ep);
        self.fps = finite_or(self.fps, 10.0).clamp(0.5, 60.0);
        self.time_threshold_secs = finite_or(self.time_threshold_secs, 15.0).clamp(1.0, 3600.0);
        self.calibration_phase_secs =
            finite_or(self.calibration_phase_secs, 30.0).clamp(3.0, 600.0);
        self.trim_percent = finite_or(self.trim_percent, 0.1).clamp(0.0, 0.45);
        self.jump_percent = finite_or(self.jump_percent, 0.5).clamp(0.0, 1.0);
        self.alert_timeout_secs = self
            .alert_timeout_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| s.clamp(1.0, 600.0));
        self.lower_is_better_channels = normalize_channel_list(&self.lower_is_better_channels);
        for path in [
            &mut self.model_path,
            &mut self.thresholds_path,
            &mut self.audio_dir,
            &mut self.output_device,
        ] {
            *path = path
                .as_ref()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());
        }
    }

    pub fn variant(&self) -> ModelVariant {
        ModelVariant::parse(&self.model_variant).unwrap_or_default()
    }

    /// Core engine configuration derived from these settings.
    pub fn engine_config(&self) -> EngineConfig {
        let mut polarity = [Polarity::HigherIsBetter; CHANNEL_COUNT];
        for name in &self.lower_is_better_channels {
            if let Some(channel) = Channel::from_name(name) {
                polarity[channel.index()] = Polarity::LowerIsBetter;
            }
        }

        EngineConfig {
            calibration: CalibrationConfig {
                trim_percent: self.trim_percent,
                jump_percent: self.jump_percent,
                phase_duration: Duration::from_secs_f64(self.calibration_phase_secs),
            },
            detection: DetectionConfig {
                time_threshold: Duration::from_secs_f64(self.time_threshold_secs),
                polarity,
            },
            alert_completion_timeout: self.alert_timeout_secs.map(Duration::from_secs_f64),
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub fn normalize_model_variant(raw: &str) -> String {
    ModelVariant::parse(raw.trim())
        .unwrap_or_default()
        .as_str()
        .into()
}

pub fn normalize_ort_ep(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cpu" => "cpu".into(),
        "dml" | "directml" => "directml".into(),
        _ => "auto".into(),
    }
}

fn normalize_channel_list(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in raw {
        let Some(channel) = Channel::from_name(&name.trim().to_ascii_uppercase()) else {
            continue;
        };
        let canonical = channel.name().to_string();
        if !out.contains(&canonical) {
            out.push(canonical);
        }
    }
    out
}

pub fn apply_runtime_env_from_settings(settings: &AppSettings) {
    if std::env::var("SITSTRAIGHT_ORT_EP").is_err() {
        std::env::set_var("SITSTRAIGHT_ORT_EP", &settings.ort_ep);
    }
}

pub fn default_settings_path() -> PathBuf {
    sitstraight_core::default_data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sitstraight-settings-{}-{name}", std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut s = AppSettings {
            model_variant: " THUNDER ".into(),
            fps: 500.0,
            trim_percent: 0.9,
            jump_percent: -1.0,
            time_threshold_secs: f64::NAN,
            alert_timeout_secs: Some(0.0),
            ort_ep: "DML".into(),
            audio_dir: Some("   ".into()),
            ..AppSettings::default()
        };
        s.normalize();
        assert_eq!(s.model_variant, "thunder");
        assert_eq!(s.fps, 60.0);
        assert_eq!(s.trim_percent, 0.45);
        assert_eq!(s.jump_percent, 0.0);
        assert_eq!(s.time_threshold_secs, 15.0);
        assert_eq!(s.alert_timeout_secs, None);
        assert_eq!(s.ort_ep, "directml");
        assert_eq!(s.audio_dir, None);
    }

    #[test]
    fn unknown_channels_are_dropped_and_duplicates_merged() {
        let mut s = AppSettings {
            lower_is_better_channels: vec![
                "left_eye".into(),
                "LEFT_EYE".into(),
                "elbow".into(),
            ],
            ..AppSettings::default()
        };
        s.normalize();
        assert_eq!(s.lower_is_better_channels, vec!["LEFT_EYE".to_string()]);

        let config = s.engine_config();
        assert_eq!(
            config.detection.polarity_of(Channel::LeftEye),
            Polarity::LowerIsBetter
        );
        assert_eq!(
            config.detection.polarity_of(Channel::RightEar),
            Polarity::HigherIsBetter
        );
    }

    #[test]
    fn engine_config_carries_durations() {
        let s = AppSettings::default();
        let config = s.engine_config();
        assert_eq!(config.detection.time_threshold, Duration::from_secs(15));
        assert_eq!(config.calibration.phase_duration, Duration::from_secs(30));
        assert_eq!(config.alert_completion_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_tolerates_missing_and_corrupt_files() {
        let path = scratch_path("corrupt");
        assert_eq!(load_settings(&path).model_variant, "lightning");

        save_settings(&path, &AppSettings::default()).expect("save");
        fs::write(&path, "{ not json").expect("corrupt");
        assert_eq!(load_settings(&path).fps, 10.0);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn save_then_load_preserves_values() {
        let path = scratch_path("persist");
        let s = AppSettings {
            audio_dir: Some("/tmp/clips".into()),
            time_threshold_secs: 20.0,
            ..AppSettings::default()
        };
        save_settings(&path, &s).expect("save");
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"timeThresholdSecs\""));

        let loaded = load_settings(&path);
        assert_eq!(loaded.audio_dir.as_deref(), Some("/tmp/clips"));
        assert_eq!(loaded.time_threshold_secs, 20.0);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }
}
