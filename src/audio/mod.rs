mod capture;
mod device;
pub mod processing;

pub use capture::{AudioSource, AudioWindow, CaptureStream};
pub use device::{
    list_audio_devices, select_capture_device, AudioDevice, DeviceType,
};

/// Both model pipelines expect 16 kHz mono; every window is resampled to
/// this rate before leaving the capture layer.
pub const SAMPLE_RATE: u32 = 16_000;
