//! Avatar-generation providers

pub mod http;

pub use http::HttpAvatarGenerator;

use crate::error::AvatarError;
use crate::model_host::AvatarAsset;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Generation job state as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarStatus {
    pub avatar_id: String,
    /// `pending`, `processing`, `completed` or `failed`
    pub status: String,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub message: Option<String>,
}

impl AvatarStatus {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

/// Remote service that turns a photo into a 3D avatar mesh.
#[async_trait]
pub trait AvatarGenerator: Send + Sync {
    /// Submit a photo and return the new avatar id.
    async fn generate(&self, user_id: &str, photo: Bytes) -> Result<String, AvatarError>;

    /// Download the mesh for a generated avatar.
    async fn fetch_asset(&self, avatar_id: &str) -> Result<AvatarAsset, AvatarError>;

    async fn status(&self, avatar_id: &str) -> Result<AvatarStatus, AvatarError>;

    /// Remove a generated avatar and its files from the service. An avatar
    /// the service no longer knows counts as deleted.
    async fn delete_avatar(&self, avatar_id: &str) -> Result<(), AvatarError>;

    /// Check the service is reachable.
    async fn health(&self) -> Result<(), AvatarError>;

    fn provider_name(&self) -> &str;
}
