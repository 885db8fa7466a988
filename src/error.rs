//! Error types for oarc-speech

use std::io;
use thiserror::Error;

/// Main error type for speech initialization
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Fatal startup failure: engine load failed, unsupported voice type,
    /// malformed model bundle
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A required voice asset is missing. The message is self-describing:
    /// it names what was expected and what was found nearby.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for speech operations
pub type Result<T> = std::result::Result<T, SpeechError>;

impl From<String> for SpeechError {
    fn from(s: String) -> Self {
        SpeechError::Other(s)
    }
}

impl From<&str> for SpeechError {
    fn from(s: &str) -> Self {
        SpeechError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for SpeechError {
    fn from(e: serde_json::Error) -> Self {
        SpeechError::Initialization(format!("JSON error: {}", e))
    }
}

impl From<hound::Error> for SpeechError {
    fn from(e: hound::Error) -> Self {
        SpeechError::Audio(format!("WAV error: {}", e))
    }
}
