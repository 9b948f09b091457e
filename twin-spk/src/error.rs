//! Error types for twin-spk

use thiserror::Error;
use twin_core::Error as CoreError;

/// Voice service errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SpeechError::InvalidResponse(err.to_string())
        } else {
            SpeechError::Network(err.to_string())
        }
    }
}

impl From<SpeechError> for CoreError {
    fn from(err: SpeechError) -> Self {
        match err {
            SpeechError::Core(inner) => inner,
            SpeechError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Collaborator(format!("Voice service: {}", other)),
        }
    }
}
