//! Configuration for the avatar-generation client

use serde::{Deserialize, Serialize};
use twin_core::ServicesConfig;

/// Avatar-generation client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarClientConfig {
    /// Base URL of the avatar-generation service
    pub endpoint: String,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Maximum accepted photo size in bytes
    pub max_photo_bytes: usize,

    /// Maximum accepted mesh asset size in bytes
    pub max_asset_bytes: usize,
}

impl Default for AvatarClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8001".to_string(),
            connect_timeout_ms: 5_000,
            max_photo_bytes: 20 * 1024 * 1024,
            max_asset_bytes: 200 * 1024 * 1024,
        }
    }
}

impl AvatarClientConfig {
    pub fn from_services(services: &ServicesConfig) -> Self {
        Self {
            endpoint: services.avatar_url.clone(),
            ..Self::default()
        }
    }

    /// Validate avatar client configuration
    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| format!("Invalid avatar endpoint '{}': {}", self.endpoint, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!(
                "Avatar endpoint must use http or https, got '{}'",
                url.scheme()
            ));
        }

        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > 60_000 {
            return Err("Connect timeout must be between 1 and 60000 ms".to_string());
        }

        if self.max_photo_bytes == 0 {
            return Err("max_photo_bytes must be greater than 0".to_string());
        }

        if self.max_asset_bytes == 0 {
            return Err("max_asset_bytes must be greater than 0".to_string());
        }

        Ok(())
    }
}
