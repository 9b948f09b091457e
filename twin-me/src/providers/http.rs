//! Avatar-generation service over HTTP

use crate::config::AvatarClientConfig;
use crate::error::AvatarError;
use crate::model_host::AvatarAsset;
use crate::providers::{AvatarGenerator, AvatarStatus};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    avatar_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Avatar generator backed by the remote generation service.
pub struct HttpAvatarGenerator {
    client: Client,
    base: Url,
    config: AvatarClientConfig,
}

impl HttpAvatarGenerator {
    pub fn new(config: AvatarClientConfig) -> Result<Self, AvatarError> {
        config.validate().map_err(AvatarError::Config)?;

        let mut endpoint = config.endpoint.trim_end_matches('/').to_string();
        endpoint.push('/');
        let base = Url::parse(&endpoint)
            .map_err(|e| AvatarError::Config(format!("Invalid avatar endpoint: {}", e)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| AvatarError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// URL under the service base built from individually escaped segments.
    pub fn url_for(&self, segments: &[&str]) -> Result<Url, AvatarError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AvatarError::Config("Avatar endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check_status(
        response: Response,
        fail: fn(String) -> AvatarError,
    ) -> Result<Response, AvatarError> {
        twin_core::http::check_status(response)
            .await
            .map_err(|failure| fail(format!("Avatar service error {}", failure)))
    }
}

fn photo_mime(photo: &[u8]) -> &'static str {
    if photo.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if photo.starts_with(b"\x89PNG") {
        "image/png"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl AvatarGenerator for HttpAvatarGenerator {
    async fn generate(&self, user_id: &str, photo: Bytes) -> Result<String, AvatarError> {
        if photo.is_empty() {
            return Err(AvatarError::GenerationFailed("Photo is empty".to_string()));
        }
        if photo.len() > self.config.max_photo_bytes {
            return Err(AvatarError::GenerationFailed(format!(
                "Photo too large: {} bytes (max: {})",
                photo.len(),
                self.config.max_photo_bytes
            )));
        }

        let mime = photo_mime(&photo);
        let part = Part::bytes(photo.to_vec())
            .file_name("photo")
            .mime_str(mime)
            .map_err(|e| AvatarError::GenerationFailed(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("user_id", user_id.to_string());

        let url = self.url_for(&["avatar", "generate"])?;
        info!("Generating avatar for user {} ({} bytes, {})", user_id, photo.len(), mime);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AvatarError::GenerationFailed(e.to_string()))?;
        let response = Self::check_status(response, AvatarError::GenerationFailed).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AvatarError::GenerationFailed(format!("Invalid response: {}", e)))?;

        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(AvatarError::GenerationFailed(error));
        }
        if body.status.as_deref() == Some("failed") {
            return Err(AvatarError::GenerationFailed(
                "Service reported failure".to_string(),
            ));
        }

        match body.avatar_id {
            Some(avatar_id) if !avatar_id.trim().is_empty() => {
                debug!("Avatar generated: {}", avatar_id);
                Ok(avatar_id)
            }
            _ => Err(AvatarError::GenerationFailed(
                "Response has no avatar_id".to_string(),
            )),
        }
    }

    async fn fetch_asset(&self, avatar_id: &str) -> Result<AvatarAsset, AvatarError> {
        let url = self.url_for(&["avatar", avatar_id, "download"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AvatarError::AssetLoadFailed(e.to_string()))?;
        let response = Self::check_status(response, AvatarError::AssetLoadFailed).await?;

        let max = self.config.max_asset_bytes;
        if response.content_length().map_or(false, |len| len > max as u64) {
            return Err(AvatarError::AssetLoadFailed(format!(
                "Asset too large (max: {} bytes)",
                max
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response
            .bytes()
            .await
            .map_err(|e| AvatarError::AssetLoadFailed(e.to_string()))?;
        if data.len() > max {
            return Err(AvatarError::AssetLoadFailed(format!(
                "Asset too large: {} bytes (max: {})",
                data.len(),
                max
            )));
        }

        debug!("Fetched asset for {}: {} bytes", avatar_id, data.len());
        Ok(AvatarAsset {
            avatar_id: avatar_id.to_string(),
            content_type,
            data,
        })
    }

    async fn status(&self, avatar_id: &str) -> Result<AvatarStatus, AvatarError> {
        let url = self.url_for(&["avatar", avatar_id, "status"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AvatarError::GenerationFailed(e.to_string()))?;
        let response = Self::check_status(response, AvatarError::GenerationFailed).await?;
        response
            .json()
            .await
            .map_err(|e| AvatarError::GenerationFailed(format!("Invalid status response: {}", e)))
    }

    async fn delete_avatar(&self, avatar_id: &str) -> Result<(), AvatarError> {
        let url = self.url_for(&["avatar", avatar_id])?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| AvatarError::GenerationFailed(e.to_string()))?;
        match twin_core::http::check_status(response).await {
            Ok(_) => {
                info!("Deleted avatar {}", avatar_id);
                Ok(())
            }
            Err(failure) if failure.is_not_found() => {
                debug!("Avatar {} already gone", avatar_id);
                Ok(())
            }
            Err(failure) => Err(AvatarError::GenerationFailed(format!(
                "Avatar service error {}",
                failure
            ))),
        }
    }

    async fn health(&self) -> Result<(), AvatarError> {
        let url = self.url_for(&["health"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AvatarError::GenerationFailed(e.to_string()))?;
        Self::check_status(response, AvatarError::GenerationFailed).await?;
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}
