//! Where downloaded avatar meshes are loaded for rendering.

use crate::error::AvatarError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

const GLB_MAGIC: &[u8; 4] = b"glTF";

/// Downloaded avatar mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarAsset {
    pub avatar_id: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl AvatarAsset {
    pub fn new(avatar_id: impl Into<String>, data: Bytes) -> Self {
        Self {
            avatar_id: avatar_id.into(),
            content_type: None,
            data,
        }
    }

    /// True when the payload carries the binary glTF header.
    pub fn is_glb(&self) -> bool {
        self.data.starts_with(GLB_MAGIC)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Renderer-side owner of loaded meshes.
#[async_trait]
pub trait ModelHost: Send + Sync {
    async fn load(&self, asset: AvatarAsset) -> Result<(), AvatarError>;

    /// Release a mesh. Unloading an unknown id is a no-op.
    async fn unload(&self, avatar_id: &str);

    fn is_loaded(&self, avatar_id: &str) -> bool;
}

/// Model host that keeps meshes in memory.
#[derive(Default)]
pub struct InMemoryModelHost {
    models: RwLock<HashMap<String, AvatarAsset>>,
}

impl InMemoryModelHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset(&self, avatar_id: &str) -> Option<AvatarAsset> {
        self.models.read().get(avatar_id).cloned()
    }

    pub fn loaded_count(&self) -> usize {
        self.models.read().len()
    }
}

#[async_trait]
impl ModelHost for InMemoryModelHost {
    async fn load(&self, asset: AvatarAsset) -> Result<(), AvatarError> {
        if asset.is_empty() {
            return Err(AvatarError::AssetLoadFailed(format!(
                "Asset for {} is empty",
                asset.avatar_id
            )));
        }
        if !asset.is_glb() {
            debug!("Asset for {} has no glTF header", asset.avatar_id);
        }

        info!("Loaded avatar {} ({} bytes)", asset.avatar_id, asset.len());
        self.models.write().insert(asset.avatar_id.clone(), asset);
        Ok(())
    }

    async fn unload(&self, avatar_id: &str) {
        if self.models.write().remove(avatar_id).is_some() {
            info!("Unloaded avatar {}", avatar_id);
        }
    }

    fn is_loaded(&self, avatar_id: &str) -> bool {
        self.models.read().contains_key(avatar_id)
    }
}
