//! Error types for twin-me

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use twin_core::Error as CoreError;
use twin_llm::LLMError;
use twin_spk::SpeechError;

/// Network stage of provisioning or a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Generation,
    AssetLoad,
    VoiceClone,
    Reply,
    Synthesis,
    AudioFetch,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Generation => "avatar generation",
            PipelineStage::AssetLoad => "asset load",
            PipelineStage::VoiceClone => "voice clone",
            PipelineStage::Reply => "reply",
            PipelineStage::Synthesis => "speech synthesis",
            PipelineStage::AudioFetch => "audio fetch",
        };
        f.write_str(name)
    }
}

/// Avatar pipeline errors
#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Avatar generation failed: {0}")]
    GenerationFailed(String),

    #[error("Asset load failed: {0}")]
    AssetLoadFailed(String),

    #[error("Voice clone failed: {0}")]
    VoiceCloneFailed(String),

    #[error("Reply failed: {0}")]
    ReplyFailed(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Audio fetch failed: {0}")]
    AudioFetchFailed(String),

    #[error("Turn superseded by a newer turn")]
    Superseded,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Playback error: {0}")]
    Playback(String),
}

impl AvatarError {
    /// Build the failure kind for `stage`.
    pub fn at_stage(stage: PipelineStage, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            PipelineStage::Generation => AvatarError::GenerationFailed(message),
            PipelineStage::AssetLoad => AvatarError::AssetLoadFailed(message),
            PipelineStage::VoiceClone => AvatarError::VoiceCloneFailed(message),
            PipelineStage::Reply => AvatarError::ReplyFailed(message),
            PipelineStage::Synthesis => AvatarError::SynthesisFailed(message),
            PipelineStage::AudioFetch => AvatarError::AudioFetchFailed(message),
        }
    }

    pub fn timed_out(stage: PipelineStage, limit: Duration) -> Self {
        Self::at_stage(stage, format!("timed out after {:?}", limit))
    }

    /// The stage this error belongs to, if any.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            AvatarError::GenerationFailed(_) => Some(PipelineStage::Generation),
            AvatarError::AssetLoadFailed(_) => Some(PipelineStage::AssetLoad),
            AvatarError::VoiceCloneFailed(_) => Some(PipelineStage::VoiceClone),
            AvatarError::ReplyFailed(_) => Some(PipelineStage::Reply),
            AvatarError::SynthesisFailed(_) => Some(PipelineStage::Synthesis),
            AvatarError::AudioFetchFailed(_) => Some(PipelineStage::AudioFetch),
            AvatarError::Superseded | AvatarError::Config(_) | AvatarError::Playback(_) => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, AvatarError::Superseded)
    }
}

impl From<AvatarError> for CoreError {
    fn from(err: AvatarError) -> Self {
        match err {
            AvatarError::Config(msg) => CoreError::Configuration(msg),
            AvatarError::Playback(msg) => CoreError::Playback(msg),
            other => CoreError::Pipeline(other.to_string()),
        }
    }
}

/// Conversion of collaborator failures into the failure kind of a stage.
pub(crate) trait IntoStageError {
    fn into_stage_error(self, stage: PipelineStage) -> AvatarError;
}

impl IntoStageError for AvatarError {
    fn into_stage_error(self, stage: PipelineStage) -> AvatarError {
        match self.stage() {
            Some(own) if own == stage => self,
            _ => AvatarError::at_stage(stage, self.to_string()),
        }
    }
}

impl IntoStageError for SpeechError {
    fn into_stage_error(self, stage: PipelineStage) -> AvatarError {
        AvatarError::at_stage(stage, self.to_string())
    }
}

impl IntoStageError for LLMError {
    fn into_stage_error(self, stage: PipelineStage) -> AvatarError {
        AvatarError::at_stage(stage, self.to_string())
    }
}

/// Run one network stage under a deadline.
///
/// Both collaborator errors and an elapsed deadline surface as the stage's
/// failure kind.
pub(crate) async fn run_stage<T, E, F>(
    stage: PipelineStage,
    limit: Duration,
    future: F,
) -> Result<T, AvatarError>
where
    F: Future<Output = Result<T, E>>,
    E: IntoStageError,
{
    match tokio::time::timeout(limit, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into_stage_error(stage)),
        Err(_) => Err(AvatarError::timed_out(stage, limit)),
    }
}
