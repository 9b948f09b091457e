//! twin-spk: voice for the avatar
//!
//! Provides:
//! - A client for the remote voice-cloning / TTS service
//! - Viseme parsing, classification and text-based estimation
//! - The playable [`SpeechClip`] handed to lip-sync playback

pub mod clip;
pub mod config;
pub mod engines;
pub mod error;
pub mod viseme;

pub use clip::{AudioAsset, SpeechClip, SpeechDescriptor, SynthesisRequest, SynthesisResponse};
pub use config::VoiceClientConfig;
pub use engines::api::ApiVoiceEngine;
pub use engines::{CloneRequest, VoiceEngine};
pub use error::SpeechError;
pub use viseme::{
    estimate_duration_ms, estimate_visemes, parse_visemes, BlendShapes, TimedAnimationEvent,
    VisemeType, WireViseme,
};
