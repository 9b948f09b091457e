use serde::{Deserialize, Serialize};
use twin_core::{ConversationConfig, ServicesConfig};

/// Reply service client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    pub endpoint: String,
    /// Path of the message endpoint, relative to `endpoint`
    pub message_path: String,
    /// Value sent as the request's `type` field
    pub message_type: String,
    pub connect_timeout_ms: u64,
    pub max_content_chars: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8002".to_string(),
            message_path: "conversation/message".to_string(),
            message_type: "text".to_string(),
            connect_timeout_ms: 5_000,
            max_content_chars: 10_000,
        }
    }
}

impl ReplyConfig {
    pub fn from_services(services: &ServicesConfig, conversation: &ConversationConfig) -> Self {
        Self {
            endpoint: services.reply_url.clone(),
            message_type: conversation.message_type.clone(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid reply endpoint '{}': {}", self.endpoint, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!(
                "Reply endpoint must use http or https, got '{}'",
                url.scheme()
            ));
        }

        if self.message_path.trim_matches('/').is_empty() {
            return Err("message_path cannot be empty".to_string());
        }

        if self.message_type.is_empty() || self.message_type.len() > 64 {
            return Err("message_type must be 1-64 chars".to_string());
        }

        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > 60_000 {
            return Err("Connect timeout must be between 1 and 60000 ms".to_string());
        }

        if self.max_content_chars == 0 {
            return Err("max_content_chars must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Message sent to the reply service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ReplyRequest {
    pub fn new(content: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: kind.into(),
        }
    }
}

/// Reply from the agent. Tone and confidence are advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub content: String,
    #[serde(default)]
    pub emotional_tone: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}
