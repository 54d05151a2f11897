use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Placeholder shipped in the sample config; treated the same as no token.
pub const PLACEHOLDER_HF_TOKEN: &str = "YOUR_HUGGINGFACE_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl ComputeDevice {
    /// whisper.cpp falls back to CPU on its own when no GPU backend was
    /// compiled in, so `auto` simply requests the GPU.
    pub fn use_gpu(self) -> bool {
        !matches!(self, ComputeDevice::Cpu)
    }
}

impl FromStr for ComputeDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ComputeDevice::Auto),
            "cpu" => Ok(ComputeDevice::Cpu),
            "cuda" => Ok(ComputeDevice::Cuda),
            other => Err(format!("unknown device '{}', expected auto|cpu|cuda", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hugging Face access token, required for the diarization model files.
    pub hf_token: String,
    /// Whisper model identifier, e.g. "tiny" or "large-v3-turbo".
    pub whisper_model: String,
    pub device: ComputeDevice,
    /// Window duration in seconds; one transcription/diarization pass per window.
    pub interval_seconds: u64,
    /// Transcription language, fixed for the session.
    pub language: String,
    /// Case-insensitive substrings that mark a capture device as loopback-like.
    pub loopback_patterns: Vec<String>,
    /// Upper bound on distinct speakers tracked within one window.
    pub max_speakers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            hf_token: String::new(),
            whisper_model: "large-v3-turbo".to_string(),
            device: ComputeDevice::Auto,
            interval_seconds: 10,
            language: "en".to_string(),
            loopback_patterns: vec!["stereo mix".to_string(), "cable".to_string()],
            max_speakers: 6,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Checked before any worker is spawned; a bad config never creates a session.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.hf_token.is_empty() || self.hf_token == PLACEHOLDER_HF_TOKEN {
            return Err(SessionError::Configuration(
                "hf_token is missing; set your Hugging Face access token".to_string(),
            ));
        }
        if self.interval_seconds == 0 {
            return Err(SessionError::Configuration(
                "interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.language.is_empty() {
            return Err(SessionError::Configuration(
                "language must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
