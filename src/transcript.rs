use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

/// Session-lifetime transcript, owned by the presentation layer. The worker
/// never touches this; chunks arrive over the event channel and are appended
/// here in emission order.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    chunks: Vec<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &str) {
        self.chunks.push(chunk.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn contents(&self) -> String {
        self.chunks.concat()
    }

    /// Write the whole transcript to `transcription_<timestamp>.txt` under
    /// `dir`, named with the moment the session stopped.
    pub fn flush_to(&self, dir: &Path) -> Result<PathBuf> {
        let file_name = format!(
            "transcription_{}.txt",
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(file_name);
        std::fs::write(&path, self.contents())
            .with_context(|| format!("failed to write transcript to {}", path.display()))?;
        Ok(path)
    }
}
