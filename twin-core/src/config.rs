// Layered configuration for the avatar pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_TIMEOUT_MS: u64 = 600_000;
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Collaborator endpoints and per-stage network timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Avatar-generation service base URL
    pub avatar_url: String,
    /// Voice cloning / speech synthesis service base URL
    pub voice_url: String,
    /// Conversational-reply service base URL
    pub reply_url: String,
    pub timeouts: StageTimeouts,
}

/// One timeout per network stage, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub generation_ms: u64,
    pub asset_ms: u64,
    pub voice_clone_ms: u64,
    pub reply_ms: u64,
    pub synthesis_ms: u64,
    pub audio_ms: u64,
}

/// Facial animation tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Exponential smoothing rate per second
    pub smoothing_rate: f32,
    /// Host tick interval used by the built-in ticker
    pub tick_interval_ms: u64,
    /// Distance below which a blend value snaps onto its target
    pub settle_epsilon: f32,
}

/// Conversation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// `type` field sent with every reply request
    pub message_type: String,
    /// Name given to cloned voices; `None` derives one from the user id
    pub voice_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            avatar_url: "http://localhost:8001".to_string(),
            voice_url: "http://localhost:8003".to_string(),
            reply_url: "http://localhost:8002".to_string(),
            timeouts: StageTimeouts::default(),
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            generation_ms: 120_000,
            asset_ms: 60_000,
            voice_clone_ms: 120_000,
            reply_ms: 30_000,
            synthesis_ms: 60_000,
            audio_ms: 30_000,
        }
    }
}

impl StageTimeouts {
    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }

    pub fn asset(&self) -> Duration {
        Duration::from_millis(self.asset_ms)
    }

    pub fn voice_clone(&self) -> Duration {
        Duration::from_millis(self.voice_clone_ms)
    }

    pub fn reply(&self) -> Duration {
        Duration::from_millis(self.reply_ms)
    }

    pub fn synthesis(&self) -> Duration {
        Duration::from_millis(self.synthesis_ms)
    }

    pub fn audio(&self) -> Duration {
        Duration::from_millis(self.audio_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("generation_ms", self.generation_ms),
            ("asset_ms", self.asset_ms),
            ("voice_clone_ms", self.voice_clone_ms),
            ("reply_ms", self.reply_ms),
            ("synthesis_ms", self.synthesis_ms),
            ("audio_ms", self.audio_ms),
        ];
        for (name, value) in all {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(ConfigError::ValidationError(format!(
                    "services.timeouts.{} must be between 1 and {}",
                    name, MAX_TIMEOUT_MS
                )));
            }
        }
        Ok(())
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            smoothing_rate: 12.0,
            tick_interval_ms: 16,
            settle_epsilon: 0.001,
        }
    }
}

impl AnimationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            message_type: "text".to_string(),
            voice_name: None,
        }
    }
}

impl ConversationConfig {
    /// Voice name to register a clone under for `user_id`.
    pub fn voice_name_for(&self, user_id: &str) -> String {
        match self.voice_name {
            Some(ref name) => name.clone(),
            None => format!("{}-voice", user_id),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Full configuration of the pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    pub services: ServicesConfig,
    pub animation: AnimationConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

impl TwinConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if path.contains("..") {
            return Err(ConfigError::IoError(format!(
                "Path traversal detected: '{}'",
                path
            )));
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        // Try JSON first
        if let Ok(config) = serde_json::from_str::<TwinConfig>(content) {
            return Ok(config);
        }

        // Try TOML
        if let Ok(config) = toml::from_str::<TwinConfig>(content) {
            return Ok(config);
        }

        // Try YAML
        if let Ok(config) = serde_yaml::from_str::<TwinConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok());
        config
    }

    /// Overlay `TWIN_*` variables resolved through `lookup`.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TWIN_AVATAR_URL") {
            self.services.avatar_url = url;
        }
        if let Some(url) = lookup("TWIN_VOICE_URL") {
            self.services.voice_url = url;
        }
        if let Some(url) = lookup("TWIN_REPLY_URL") {
            self.services.reply_url = url;
        }
        if let Some(rate) = lookup("TWIN_SMOOTHING_RATE").and_then(|v| v.parse::<f32>().ok()) {
            self.animation.smoothing_rate = rate;
        }
        if let Some(ms) = lookup("TWIN_TICK_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.animation.tick_interval_ms = ms;
        }
        if let Some(level) = lookup("TWIN_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(&mut self, other: TwinConfig) {
        self.services = other.services;
        self.animation = other.animation;
        self.conversation = other.conversation;
        self.logging = other.logging;
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("services.avatar_url", &self.services.avatar_url)?;
        validate_url("services.voice_url", &self.services.voice_url)?;
        validate_url("services.reply_url", &self.services.reply_url)?;
        self.services.timeouts.validate()?;

        let rate = self.animation.smoothing_rate;
        if !rate.is_finite() || rate <= 0.0 || rate > 1000.0 {
            return Err(ConfigError::ValidationError(
                "animation.smoothing_rate must be in (0, 1000]".to_string(),
            ));
        }

        if self.animation.tick_interval_ms == 0 || self.animation.tick_interval_ms > 1000 {
            return Err(ConfigError::ValidationError(
                "animation.tick_interval_ms must be between 1 and 1000".to_string(),
            ));
        }

        if !(0.0..=0.1).contains(&self.animation.settle_epsilon) {
            return Err(ConfigError::ValidationError(
                "animation.settle_epsilon must be between 0.0 and 0.1".to_string(),
            ));
        }

        let message_type = &self.conversation.message_type;
        if message_type.is_empty() || message_type.len() > 64 {
            return Err(ConfigError::ValidationError(
                "conversation.message_type must be 1-64 chars".to_string(),
            ));
        }

        if let Some(ref name) = self.conversation.voice_name {
            if name.is_empty() || name.len() > 256 || name.chars().any(|c| c.is_control()) {
                return Err(ConfigError::ValidationError(
                    "conversation.voice_name is invalid".to_string(),
                ));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {:?}",
                LOG_LEVELS
            )));
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::ValidationError(format!("{} is not a valid URL: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::ValidationError(format!(
            "{} must use http or https, got '{}'",
            field, other
        ))),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}
