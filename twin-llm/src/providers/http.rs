use crate::config::{ReplyConfig, ReplyRequest, ReplyResponse};
use crate::error::{LLMError, Result};
use crate::providers::trait_impl::ReplyProvider;
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Conversational reply service reached over HTTP.
pub struct HttpReplyProvider {
    client: Client,
    message_url: Url,
    health_url: Url,
    config: ReplyConfig,
}

impl HttpReplyProvider {
    pub fn new(config: ReplyConfig) -> Result<Self> {
        config.validate().map_err(LLMError::Config)?;

        let mut endpoint = config.endpoint.trim_end_matches('/').to_string();
        endpoint.push('/');
        let base = Url::parse(&endpoint)
            .map_err(|e| LLMError::Config(format!("Invalid reply endpoint: {}", e)))?;
        let message_url = base
            .join(config.message_path.trim_start_matches('/'))
            .map_err(|e| LLMError::Config(format!("Invalid message path: {}", e)))?;
        let health_url = base
            .join("health")
            .map_err(|e| LLMError::Config(format!("Invalid health path: {}", e)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| LLMError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            message_url,
            health_url,
            config,
        })
    }

    pub fn message_url(&self) -> &Url {
        &self.message_url
    }

    pub fn config(&self) -> &ReplyConfig {
        &self.config
    }

    async fn check_status(response: Response) -> Result<Response> {
        twin_core::http::check_status(response)
            .await
            .map_err(|failure| LLMError::Provider(format!("Reply service error {}", failure)))
    }
}

#[async_trait]
impl ReplyProvider for HttpReplyProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn reply(&self, request: ReplyRequest) -> Result<ReplyResponse> {
        if request.content.trim().is_empty() {
            return Err(LLMError::InvalidInput("Message cannot be empty".to_string()));
        }
        let chars = request.content.chars().count();
        if chars > self.config.max_content_chars {
            return Err(LLMError::InvalidInput(format!(
                "Message too long: {} chars (max: {})",
                chars, self.config.max_content_chars
            )));
        }

        debug!("Requesting reply for {} chars", chars);
        let response = self
            .client
            .post(self.message_url.clone())
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body = response.bytes().await?;
        let reply: ReplyResponse = serde_json::from_slice(&body)?;

        if reply.content.trim().is_empty() {
            return Err(LLMError::InvalidResponse(
                "Reply content is empty".to_string(),
            ));
        }

        debug!(
            "Reply received: {} chars (tone: {})",
            reply.content.chars().count(),
            reply.emotional_tone.as_deref().unwrap_or("none")
        );
        Ok(reply)
    }

    async fn health(&self) -> Result<()> {
        let response = self.client.get(self.health_url.clone()).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
