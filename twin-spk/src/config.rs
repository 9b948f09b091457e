//! Configuration for the voice service client

use serde::{Deserialize, Serialize};
use twin_core::ServicesConfig;

/// Voice service client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceClientConfig {
    /// Base URL of the voice-cloning / TTS service
    pub endpoint: String,

    /// Connect timeout in milliseconds; whole-call deadlines are applied by callers
    pub connect_timeout_ms: u64,

    /// Maximum accepted audio download size in bytes
    pub max_audio_bytes: usize,

    /// Maximum accepted voice sample size in bytes
    pub max_sample_bytes: usize,

    /// Maximum text length accepted for synthesis
    pub max_text_chars: usize,
}

impl Default for VoiceClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8003".to_string(),
            connect_timeout_ms: 5_000,
            max_audio_bytes: 50 * 1024 * 1024,
            max_sample_bytes: 50 * 1024 * 1024,
            max_text_chars: 5_000,
        }
    }
}

impl VoiceClientConfig {
    /// Build a client configuration from the shared service endpoints.
    pub fn from_services(services: &ServicesConfig) -> Self {
        Self {
            endpoint: services.voice_url.clone(),
            ..Self::default()
        }
    }

    /// Validate voice client configuration
    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid voice endpoint '{}': {}", self.endpoint, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!(
                "Voice endpoint must use http or https, got '{}'",
                url.scheme()
            ));
        }

        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > 60_000 {
            return Err("Connect timeout must be between 1 and 60000 ms".to_string());
        }

        if self.max_audio_bytes == 0 {
            return Err("max_audio_bytes must be greater than 0".to_string());
        }

        if self.max_sample_bytes == 0 {
            return Err("max_sample_bytes must be greater than 0".to_string());
        }

        if self.max_text_chars == 0 || self.max_text_chars > 100_000 {
            return Err("max_text_chars must be between 1 and 100000".to_string());
        }

        Ok(())
    }
}
