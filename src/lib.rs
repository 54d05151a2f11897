pub mod align;
pub mod audio;
pub mod config;
pub mod diarize;
pub mod error;
pub mod models;
pub mod session;
pub mod transcribe;
pub mod transcript;

pub use align::{align, format_lines, SpeakerLine, SpeakerSegment, Word};
pub use audio::{
    list_audio_devices, select_capture_device, AudioDevice, AudioSource, AudioWindow,
    CaptureStream, DeviceType, SAMPLE_RATE,
};
pub use config::{ComputeDevice, Settings};
pub use diarize::{Diarizer, PyannoteDiarizer};
pub use error::SessionError;
pub use session::{Session, SessionEvent, SessionHandle, SessionState};
pub use transcribe::{Transcriber, WhisperModel, WhisperTranscriber};
pub use transcript::TranscriptBuffer;
