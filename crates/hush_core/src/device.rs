//! Audio Device Discovery
//!
//! Descriptors for listing devices, and name-based resolution of the
//! capture and playback devices a session opens.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Direction of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
}

/// Listing entry for one audio device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub name: String,
    pub device_type: DeviceType,
    pub is_default: bool,

    /// Common sample rates the device accepts (empty if querying failed)
    pub sample_rates: Vec<u32>,

    pub max_channels: u16,
}

/// Rates probed against each device's supported ranges
const COMMON_RATES: [u32; 4] = [44100, 48000, 88200, 96000];

impl AudioDevice {
    /// List every capture and playback device on the default host
    pub fn enumerate_all() -> EngineResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        if let Ok(inputs) = host.input_devices() {
            devices.extend(inputs.filter_map(|device| {
                Self::describe(&device, DeviceType::Input, default_input.as_deref())
            }));
        }
        if let Ok(outputs) = host.output_devices() {
            devices.extend(outputs.filter_map(|device| {
                Self::describe(&device, DeviceType::Output, default_output.as_deref())
            }));
        }

        if devices.is_empty() {
            return Err(EngineError::NoDevicesFound);
        }
        Ok(devices)
    }

    pub fn enumerate_inputs() -> EngineResult<Vec<AudioDevice>> {
        Ok(Self::enumerate_all()?
            .into_iter()
            .filter(|d| d.device_type == DeviceType::Input)
            .collect())
    }

    pub fn default_input() -> EngineResult<AudioDevice> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(EngineError::NoDevicesFound)?;
        Self::describe(&device, DeviceType::Input, None)
            .map(|d| AudioDevice { is_default: true, ..d })
            .ok_or(EngineError::NoDevicesFound)
    }

    pub fn default_output() -> EngineResult<AudioDevice> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(EngineError::NoDevicesFound)?;
        Self::describe(&device, DeviceType::Output, None)
            .map(|d| AudioDevice { is_default: true, ..d })
            .ok_or(EngineError::NoDevicesFound)
    }

    fn describe(
        device: &cpal::Device,
        device_type: DeviceType,
        default_name: Option<&str>,
    ) -> Option<Self> {
        let name = device.name().ok()?;
        let ranges: Vec<cpal::SupportedStreamConfigRange> = match device_type {
            DeviceType::Input => device.supported_input_configs().ok()?.collect(),
            DeviceType::Output => device.supported_output_configs().ok()?.collect(),
        };

        let max_channels = ranges.iter().map(|r| r.channels()).max().unwrap_or(0);
        let sample_rates = COMMON_RATES
            .into_iter()
            .filter(|&rate| {
                ranges.iter().any(|r| {
                    rate >= r.min_sample_rate().0 && rate <= r.max_sample_rate().0
                })
            })
            .collect();

        Some(AudioDevice {
            is_default: default_name == Some(name.as_str()),
            name,
            device_type,
            sample_rates,
            max_channels,
        })
    }
}

/// Resolve the capture device: by exact name, or the host default
pub(crate) fn find_input_device(host: &cpal::Host, name: Option<&str>) -> EngineResult<cpal::Device> {
    match name {
        None => host.default_input_device().ok_or(EngineError::NoDevicesFound),
        Some(wanted) => host
            .input_devices()
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| EngineError::DeviceNotFound(wanted.to_string())),
    }
}

/// Resolve the playback device: by exact name, or the host default
pub(crate) fn find_output_device(host: &cpal::Host, name: Option<&str>) -> EngineResult<cpal::Device> {
    match name {
        None => host.default_output_device().ok_or(EngineError::NoDevicesFound),
        Some(wanted) => host
            .output_devices()
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| EngineError::DeviceNotFound(wanted.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_device_serialization() {
        let device = AudioDevice {
            name: "USB Mic".to_string(),
            device_type: DeviceType::Input,
            is_default: true,
            sample_rates: vec![44100, 48000],
            max_channels: 1,
        };

        let json = serde_json::to_string(&device).unwrap();
        let deserialized: AudioDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(device, deserialized);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_enumerate_inputs() {
        let devices = AudioDevice::enumerate_inputs().unwrap();
        assert!(devices.iter().all(|d| d.device_type == DeviceType::Input));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_default_output() {
        let device = AudioDevice::default_output().unwrap();
        assert!(device.is_default);
        assert_eq!(device.device_type, DeviceType::Output);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_find_default_input() {
        let host = cpal::default_host();
        assert!(find_input_device(&host, None).is_ok());
    }

    #[test]
    fn test_find_missing_device_by_name() {
        let host = cpal::default_host();
        let result = find_output_device(&host, Some("no-such-device-0xdeadbeef"));
        assert!(result.is_err());
    }
}
