use thiserror::Error;
use twin_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<LLMError> for CoreError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Collaborator(format!("Reply service: {}", other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, LLMError>;
