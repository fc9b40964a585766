//! Audio device enumeration.

use serde::{Deserialize, Serialize};

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

/// Metadata about one audio device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub kind: DeviceKind,
    /// Whether this is the system default for its direction.
    pub is_default: bool,
}

/// Defaults first, then alphabetical, inputs before outputs.
pub fn sort_devices(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| {
        (
            d.kind == DeviceKind::Output,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
}

/// List available input and output devices.
///
/// Returns an empty `Vec` when compiled without a backend or when the host
/// cannot enumerate anything.
#[cfg(feature = "audio-cpal")]
pub fn list_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    let mut list = Vec::new();
    match host.input_devices() {
        Ok(devices) => list.extend(devices.filter_map(|d| d.name().ok()).map(|name| DeviceInfo {
            is_default: default_input.as_deref() == Some(name.as_str()),
            kind: DeviceKind::Input,
            name,
        })),
        Err(e) => tracing::warn!("failed to enumerate input devices: {e}"),
    }
    match host.output_devices() {
        Ok(devices) => list.extend(devices.filter_map(|d| d.name().ok()).map(|name| DeviceInfo {
            is_default: default_output.as_deref() == Some(name.as_str()),
            kind: DeviceKind::Output,
            name,
        })),
        Err(e) => tracing::warn!("failed to enumerate output devices: {e}"),
    }

    sort_devices(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_devices() -> Vec<DeviceInfo> {
    vec![]
}
