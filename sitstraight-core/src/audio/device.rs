//! Output device enumeration for alert playback.

use serde::{Deserialize, Serialize};

/// Metadata about an audio output device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default output device.
    pub is_default: bool,
}

/// Order devices default-first, then by case-insensitive name.
pub fn sort_devices(list: &mut [OutputDeviceInfo]) {
    list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// List the available audio output devices.
///
/// Returns an empty `Vec` if enumeration fails or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    OutputDeviceInfo { name, is_default }
                })
                .collect::<Vec<_>>();
            sort_devices(&mut list);
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            default_name
                .map(|name| {
                    vec![OutputDeviceInfo {
                        name,
                        is_default: true,
                    }]
                })
                .unwrap_or_default()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_device_sorts_first() {
        let mut list = vec![
            OutputDeviceInfo {
                name: "alpha".into(),
                is_default: false,
            },
            OutputDeviceInfo {
                name: "Speakers".into(),
                is_default: true,
            },
            OutputDeviceInfo {
                name: "Beta".into(),
                is_default: false,
            },
        ];
        sort_devices(&mut list);
        let names: Vec<_> = list.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Speakers", "alpha", "Beta"]);
    }

    #[test]
    fn device_info_serializes_camel_case() {
        let json = serde_json::to_value(OutputDeviceInfo {
            name: "Speakers".into(),
            is_default: true,
        })
        .expect("serialize device");
        assert_eq!(json["isDefault"], true);
    }
}
