//! HTTP voice engine for the voice-cloning / TTS service

use crate::clip::{AudioAsset, SpeechDescriptor, SynthesisRequest, SynthesisResponse};
use crate::config::VoiceClientConfig;
use crate::engines::{CloneRequest, VoiceEngine};
use crate::error::SpeechError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct VoiceCloneResponse {
    #[serde(default)]
    voice_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserVoiceResponse {
    #[serde(default)]
    voice_id: Option<String>,
}

/// Voice engine backed by the remote HTTP service.
pub struct ApiVoiceEngine {
    client: Client,
    base: Url,
    config: VoiceClientConfig,
}

impl ApiVoiceEngine {
    pub fn new(config: VoiceClientConfig) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Config)?;

        // Trailing slash so relative joins keep any path prefix
        let mut endpoint = config.endpoint.trim_end_matches('/').to_string();
        endpoint.push('/');
        let base = Url::parse(&endpoint)
            .map_err(|e| SpeechError::Config(format!("Invalid voice endpoint: {}", e)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| SpeechError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.base.as_str()
    }

    /// Resolve a service path or audio URL against the service base.
    pub fn resolve(&self, path: &str) -> Result<Url, SpeechError> {
        let relative = path.trim_start_matches('/');
        let url = match Url::parse(path) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base
                .join(relative)
                .map_err(|e| SpeechError::InvalidInput(format!("Invalid URL '{}': {}", path, e)))?,
            Err(e) => {
                return Err(SpeechError::InvalidInput(format!(
                    "Invalid URL '{}': {}",
                    path, e
                )))
            }
        };

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SpeechError::InvalidInput(format!(
                "Unsupported URL scheme '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// `voice/user/{user_id}` with the id escaped as one path segment.
    fn user_voice_url(&self, user_id: &str) -> Result<Url, SpeechError> {
        if user_id.trim().is_empty() {
            return Err(SpeechError::InvalidInput("User id cannot be empty".to_string()));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SpeechError::Config("Voice endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(&["voice", "user", user_id]);
        Ok(url)
    }

    async fn check_status(response: Response) -> Result<Response, SpeechError> {
        twin_core::http::check_status(response)
            .await
            .map_err(|failure| SpeechError::Api(format!("Voice service error {}", failure)))
    }
}

#[async_trait]
impl VoiceEngine for ApiVoiceEngine {
    async fn clone_voice(&self, request: CloneRequest) -> Result<String, SpeechError> {
        if request.samples.is_empty() {
            return Err(SpeechError::InvalidInput(
                "At least one voice sample is required".to_string(),
            ));
        }
        if request.voice_name.trim().is_empty() {
            return Err(SpeechError::InvalidInput(
                "Voice name cannot be empty".to_string(),
            ));
        }

        let mut form = Form::new()
            .text("user_id", request.user_id.clone())
            .text("voice_name", request.voice_name.clone());

        for (index, sample) in request.samples.iter().enumerate() {
            if sample.is_empty() {
                return Err(SpeechError::InvalidInput(format!(
                    "Voice sample {} is empty",
                    index
                )));
            }
            if sample.len() > self.config.max_sample_bytes {
                return Err(SpeechError::InvalidInput(format!(
                    "Voice sample {} too large: {} bytes (max: {})",
                    index,
                    sample.len(),
                    self.config.max_sample_bytes
                )));
            }
            let part = Part::bytes(sample.to_vec())
                .file_name(format!("sample_{}.wav", index))
                .mime_str("application/octet-stream")?;
            form = form.part("files", part);
        }

        let url = self.resolve("voice/clone")?;
        info!(
            "Cloning voice '{}' for user {} from {} sample(s)",
            request.voice_name,
            request.user_id,
            request.samples.len()
        );

        let response = self.client.post(url).multipart(form).send().await?;
        let response = Self::check_status(response).await?;
        let body: VoiceCloneResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(format!("Clone response: {}", e)))?;

        match body.voice_id {
            Some(voice_id) if !voice_id.trim().is_empty() => {
                debug!("Voice cloned: {}", voice_id);
                Ok(voice_id)
            }
            _ => Err(SpeechError::InvalidResponse(
                "Clone response has no voice_id".to_string(),
            )),
        }
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechDescriptor, SpeechError> {
        if request.text.trim().is_empty() {
            return Err(SpeechError::InvalidInput(
                "Text cannot be empty".to_string(),
            ));
        }
        let chars = request.text.chars().count();
        if chars > self.config.max_text_chars {
            return Err(SpeechError::InvalidInput(format!(
                "Text too long: {} chars (max: {})",
                chars, self.config.max_text_chars
            )));
        }

        let url = self.resolve("tts/with-visemes")?;
        debug!(
            "Synthesizing {} chars for user {} (voice: {})",
            chars,
            request.user_id,
            request.voice_id.as_deref().unwrap_or("default")
        );

        let response = self.client.post(url).json(request).send().await?;
        let response = Self::check_status(response).await?;
        let body: SynthesisResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(format!("Synthesis response: {}", e)))?;

        let descriptor = body.into_descriptor().map_err(SpeechError::InvalidResponse)?;
        debug!(
            "Synthesis returned {} visemes over {:?}",
            descriptor.events.len(),
            descriptor.duration
        );
        Ok(descriptor)
    }

    async fn fetch_audio(&self, audio_url: &str) -> Result<AudioAsset, SpeechError> {
        let url = self.resolve(audio_url)?;
        let response = self.client.get(url.clone()).send().await?;
        let response = Self::check_status(response).await?;

        let max = self.config.max_audio_bytes;
        if let Some(content_length) = response.content_length() {
            if content_length > max as u64 {
                return Err(SpeechError::InvalidResponse(format!(
                    "Audio too large: {} bytes (max: {})",
                    content_length, max
                )));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = response.bytes().await?;
        if data.len() > max {
            return Err(SpeechError::InvalidResponse(format!(
                "Audio too large: {} bytes (max: {})",
                data.len(),
                max
            )));
        }
        if data.is_empty() {
            warn!("Audio at {} is empty", url);
        }

        Ok(AudioAsset {
            source: url.to_string(),
            content_type,
            data,
        })
    }

    async fn user_voice(&self, user_id: &str) -> Result<Option<String>, SpeechError> {
        let url = self.user_voice_url(user_id)?;
        let response = self.client.get(url).send().await?;
        let response = match twin_core::http::check_status(response).await {
            Ok(response) => response,
            Err(failure) if failure.is_not_found() => return Ok(None),
            Err(failure) => {
                return Err(SpeechError::Api(format!("Voice service error {}", failure)))
            }
        };
        let body: UserVoiceResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(format!("User voice response: {}", e)))?;
        Ok(body.voice_id.filter(|id| !id.trim().is_empty()))
    }

    async fn delete_user_voice(&self, user_id: &str) -> Result<bool, SpeechError> {
        let url = self.user_voice_url(user_id)?;
        let response = self.client.delete(url).send().await?;
        match twin_core::http::check_status(response).await {
            Ok(_) => {
                info!("Deleted cloned voice for user {}", user_id);
                Ok(true)
            }
            Err(failure) if failure.is_not_found() => Ok(false),
            Err(failure) => Err(SpeechError::Api(format!("Voice service error {}", failure))),
        }
    }

    async fn health(&self) -> Result<(), SpeechError> {
        let url = self.resolve("health")?;
        let response = self.client.get(url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "voice-api"
    }
}
