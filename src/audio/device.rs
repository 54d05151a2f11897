use std::fmt;

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;
use tracing::info;

use crate::error::SessionError;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Debug)]
pub enum DeviceType {
    Input,
    Output,
}

/// A capture candidate. `Output` devices are opened in loopback mode, i.e.
/// an input stream is built against them so the system's own playback is
/// captured.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Debug)]
pub struct AudioDevice {
    pub name: String,
    pub device_type: DeviceType,
}

impl AudioDevice {
    pub fn new(name: String, device_type: DeviceType) -> Self {
        AudioDevice { name, device_type }
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name,
            match self.device_type {
                DeviceType::Input => "input",
                DeviceType::Output => "output",
            }
        )
    }
}

pub fn list_audio_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    for device in host.input_devices()? {
        if let Ok(name) = device.name() {
            devices.push(AudioDevice::new(name, DeviceType::Input));
        }
    }

    for device in host.output_devices()? {
        if let Ok(name) = device.name() {
            devices.push(AudioDevice::new(name, DeviceType::Output));
        }
    }

    Ok(devices)
}

/// Pick the capture device for a session: the first input whose name
/// matches one of the configured loopback-like patterns (case-insensitive
/// substring), otherwise the default output device opened in loopback mode.
pub fn select_capture_device(patterns: &[String]) -> Result<AudioDevice, SessionError> {
    let devices =
        list_audio_devices().map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

    for device in &devices {
        if device.device_type != DeviceType::Input {
            continue;
        }
        let name = device.name.to_lowercase();
        if patterns.iter().any(|p| name.contains(&p.to_lowercase())) {
            info!("selected loopback-like capture device: {}", device);
            return Ok(device.clone());
        }
    }

    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        SessionError::DeviceUnavailable("no default output device found".to_string())
    })?;
    let name = device
        .name()
        .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
    info!("no loopback-like device matched, using default output: {}", name);
    Ok(AudioDevice::new(name, DeviceType::Output))
}

pub(crate) fn get_cpal_device_and_config(
    audio_device: &AudioDevice,
) -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    let host = cpal::default_host();
    let is_output_device = audio_device.device_type == DeviceType::Output;

    let mut devices = match audio_device.device_type {
        DeviceType::Input => host.input_devices()?,
        DeviceType::Output => host.output_devices()?,
    };

    let cpal_audio_device = devices
        .find(|x| x.name().map(|y| y == audio_device.name).unwrap_or(false))
        .ok_or_else(|| anyhow!("audio device not found: {}", audio_device.name))?;

    let config = if is_output_device {
        cpal_audio_device.default_output_config()?
    } else {
        cpal_audio_device.default_input_config()?
    };

    Ok((cpal_audio_device, config))
}
