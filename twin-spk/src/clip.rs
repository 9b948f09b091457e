//! Synthesized speech: wire request/response and the playable clip.

use crate::viseme::{parse_visemes, TimedAnimationEvent, WireViseme};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Request body for speech synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>, voice_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            voice_id,
        }
    }
}

/// Response body from speech synthesis.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisResponse {
    pub audio_url: String,
    #[serde(default)]
    pub visemes: Vec<WireViseme>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub text: String,
}

impl SynthesisResponse {
    /// Validate and repair the wire payload into a descriptor.
    pub fn into_descriptor(self) -> Result<SpeechDescriptor, String> {
        if self.audio_url.trim().is_empty() {
            return Err("Synthesis response has no audio_url".to_string());
        }

        let events = parse_visemes(self.visemes);
        let last_end = events.iter().map(|e| e.end_ms).max().unwrap_or(0);

        let duration_ms = match self.duration_ms {
            Some(ms) if ms.is_finite() && ms > 0.0 => ms.round() as u64,
            other => {
                if other.is_some() {
                    warn!("Invalid duration_ms {:?}, using last viseme end", other);
                }
                last_end
            }
        };

        Ok(SpeechDescriptor {
            audio_url: self.audio_url,
            events,
            duration: Duration::from_millis(duration_ms),
            text: self.text,
        })
    }
}

/// Everything synthesis returns except the audio bytes themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechDescriptor {
    pub audio_url: String,
    pub events: Vec<TimedAnimationEvent>,
    pub duration: Duration,
    pub text: String,
}

/// Downloaded audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub source: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl AudioAsset {
    pub fn new(source: impl Into<String>, data: Bytes) -> Self {
        Self {
            source: source.into(),
            content_type: None,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One utterance ready for playback: audio plus its ordered viseme events.
///
/// Consumed exactly once by the player and dropped when playback ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub audio: AudioAsset,
    pub events: Vec<TimedAnimationEvent>,
    pub duration: Duration,
}

impl SpeechClip {
    pub fn new(audio: AudioAsset, events: Vec<TimedAnimationEvent>, duration: Duration) -> Self {
        Self {
            audio,
            events,
            duration,
        }
    }

    pub fn from_descriptor(descriptor: SpeechDescriptor, audio: AudioAsset) -> Self {
        Self::new(audio, descriptor.events, descriptor.duration)
    }
}
