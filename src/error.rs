//! Error types for the audio tooling library.
//!
//! Every failure is raised to the immediate caller, which is expected to turn
//! it into a user-visible notification. Nothing here is retried automatically.

use thiserror::Error;

/// Errors produced by the analyzer, the transcoding pipeline and the image resampler
#[derive(Debug, Error)]
pub enum AudioToolsError {
    /// The input could not be decoded into PCM samples
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// The media engine could not be initialised (missing binary, failed download, ...)
    #[error("Failed to load media engine: {0}")]
    EngineLoad(String),

    /// The engine ran the job and exited with a non-zero code
    #[error("Media engine crashed (exit code {exit_code})")]
    Conversion { exit_code: i32 },

    /// The job was interrupted by `cancel()`
    #[error("Conversion was cancelled")]
    Cancelled,

    /// The image could not be decoded
    #[error("Failed to load image: {0}")]
    ImageLoad(String),

    /// No drawing surface could be allocated for the requested dimensions
    #[error("Failed to acquire drawing surface: {0}")]
    Context(String),

    /// Neither the primary nor the fallback resize path produced an image
    #[error("Failed to resize image: {0}")]
    Resize(String),

    /// The processing settings are not usable
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl AudioToolsError {
    /// Exit code reported by the engine, if this is a conversion failure
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Conversion { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}

impl From<&str> for AudioToolsError {
    fn from(s: &str) -> Self {
        AudioToolsError::Other(s.to_string())
    }
}

impl From<String> for AudioToolsError {
    fn from(s: String) -> Self {
        AudioToolsError::Other(s)
    }
}

/// Result type for the library
pub type Result<T> = std::result::Result<T, AudioToolsError>;
