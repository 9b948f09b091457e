//! Voice service engines

pub mod api;

use crate::clip::{AudioAsset, SpeechDescriptor, SynthesisRequest};
use crate::error::SpeechError;
use async_trait::async_trait;
use bytes::Bytes;

/// Voice sample upload for cloning.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub user_id: String,
    pub voice_name: String,
    pub samples: Vec<Bytes>,
}

/// Remote voice-cloning and synthesis service.
#[async_trait]
pub trait VoiceEngine: Send + Sync {
    /// Clone a voice from one or more samples, returning the new voice id.
    async fn clone_voice(&self, request: CloneRequest) -> Result<String, SpeechError>;

    /// Synthesize text and return the audio location plus viseme timing.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechDescriptor, SpeechError>;

    /// Download synthesized audio. Relative URLs resolve against the service.
    async fn fetch_audio(&self, audio_url: &str) -> Result<AudioAsset, SpeechError>;

    /// Voice id currently registered for `user_id`, if any.
    async fn user_voice(&self, user_id: &str) -> Result<Option<String>, SpeechError>;

    /// Delete the cloned voice registered for `user_id`. Returns `false` when
    /// the user had none.
    async fn delete_user_voice(&self, user_id: &str) -> Result<bool, SpeechError>;

    /// Check the service is reachable.
    async fn health(&self) -> Result<(), SpeechError>;

    /// Get engine name
    fn name(&self) -> &str;
}
