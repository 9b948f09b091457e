use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const MAX_ID_LEN: usize = 256;

/// The provisioned identity of one avatar: who it belongs to, which mesh it
/// renders and which voice it speaks with.
///
/// Immutable once created. A missing `voice_id` means speech is synthesized
/// with the service's default voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHandle {
    user_id: String,
    avatar_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voice_id: Option<String>,
}

impl IdentityHandle {
    pub fn new(
        user_id: impl Into<String>,
        avatar_id: impl Into<String>,
        voice_id: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            avatar_id: avatar_id.into(),
            voice_id,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn avatar_id(&self) -> &str {
        &self.avatar_id
    }

    pub fn voice_id(&self) -> Option<&str> {
        self.voice_id.as_deref()
    }

    /// True when the identity speaks with a cloned voice rather than the default.
    pub fn has_cloned_voice(&self) -> bool {
        self.voice_id.is_some()
    }

    /// Validate an identity, typically one re-supplied from storage.
    pub fn validate(&self) -> std::result::Result<(), String> {
        validate_id("user_id", &self.user_id)?;
        validate_id("avatar_id", &self.avatar_id)?;
        if let Some(ref voice_id) = self.voice_id {
            validate_id("voice_id", voice_id)?;
        }
        Ok(())
    }

    /// Load a persisted identity from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let identity: IdentityHandle = serde_json::from_str(&content)?;
        identity.validate().map_err(Error::InvalidIdentity)?;
        Ok(identity)
    }

    /// Persist the identity as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl fmt::Display for IdentityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user={} avatar={} voice={}",
            self.user_id,
            self.avatar_id,
            self.voice_id.as_deref().unwrap_or("default")
        )
    }
}

fn validate_id(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    if value.len() > MAX_ID_LEN {
        return Err(format!("{} too long (max {} chars)", field, MAX_ID_LEN));
    }
    if value.chars().any(|c| c == '\0' || c.is_control()) {
        return Err(format!("{} contains invalid characters", field));
    }
    Ok(())
}

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// One exchange in a conversation. The history itself belongs to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
