use thiserror::Error;

/// Failure classes surfaced to the presentation layer. Everything below the
/// session boundary uses `anyhow` and gets folded into one of these at the
/// top of the worker.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),
}
