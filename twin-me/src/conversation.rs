//! Conversation turns: user text to a spoken, lip-synced agent reply.

use crate::error::{run_stage, AvatarError, PipelineStage};
use crate::playback::PlayerHandle;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use twin_core::{IdentityHandle, StageTimeouts};
use twin_llm::{ReplyProvider, ReplyRequest};
use twin_spk::{SpeechClip, SynthesisRequest, VisemeType, VoiceEngine};

/// Result of one completed turn. Playback runs on after this is returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReply {
    pub turn: u64,
    pub text: String,
    pub emotional_tone: Option<String>,
    pub confidence: Option<f32>,
    pub duration: Duration,
    pub viseme_count: usize,
}

/// Reply, synthesize, fetch audio, then hand the clip to the player.
///
/// Starting a turn cancels whatever the avatar is saying. A turn overtaken by
/// a newer one while its network stages are in flight is abandoned with
/// [`AvatarError::Superseded`] and never reaches the player.
pub struct ConversationPipeline {
    reply: Arc<dyn ReplyProvider>,
    voice: Arc<dyn VoiceEngine>,
    player: PlayerHandle,
    timeouts: StageTimeouts,
    message_type: String,
    generation: AtomicU64,
}

impl ConversationPipeline {
    pub fn new(
        reply: Arc<dyn ReplyProvider>,
        voice: Arc<dyn VoiceEngine>,
        player: PlayerHandle,
        timeouts: StageTimeouts,
        message_type: impl Into<String>,
    ) -> Self {
        Self {
            reply,
            voice,
            player,
            timeouts,
            message_type: message_type.into(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    /// Turn number of the most recent `converse` call.
    pub fn current_turn(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn converse(
        &self,
        identity: &IdentityHandle,
        user_text: &str,
    ) -> Result<AgentReply, AvatarError> {
        let turn = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.player.cancel(turn)?;
        debug!("Turn {} started for {}", turn, identity);

        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(AvatarError::ReplyFailed("Message cannot be empty".to_string()));
        }

        let reply = run_stage(
            PipelineStage::Reply,
            self.timeouts.reply(),
            self.reply
                .reply(ReplyRequest::new(user_text, self.message_type.as_str())),
        )
        .await?;
        self.ensure_current(turn, PipelineStage::Reply)?;

        let request = SynthesisRequest::new(
            reply.content.as_str(),
            identity.user_id(),
            identity.voice_id().map(str::to_string),
        );
        let descriptor = run_stage(
            PipelineStage::Synthesis,
            self.timeouts.synthesis(),
            self.voice.synthesize(&request),
        )
        .await?;
        self.ensure_current(turn, PipelineStage::Synthesis)?;

        let audio = run_stage(
            PipelineStage::AudioFetch,
            self.timeouts.audio(),
            self.voice.fetch_audio(&descriptor.audio_url),
        )
        .await?;
        self.ensure_current(turn, PipelineStage::AudioFetch)?;

        let clip = SpeechClip::from_descriptor(descriptor, audio);
        let duration = clip.duration;
        let viseme_count = clip.events.len();
        let speaking = clip
            .events
            .iter()
            .filter(|e| VisemeType::from_label(&e.viseme_type) != Some(VisemeType::Rest))
            .count();

        self.player.play(clip, turn)?;
        info!(
            "Turn {} playing: {} visemes ({} articulated) over {:?}",
            turn, viseme_count, speaking, duration
        );

        Ok(AgentReply {
            turn,
            text: reply.content,
            emotional_tone: reply.emotional_tone,
            confidence: reply.confidence,
            duration,
            viseme_count,
        })
    }

    fn ensure_current(&self, turn: u64, stage: PipelineStage) -> Result<(), AvatarError> {
        let latest = self.generation.load(Ordering::SeqCst);
        if latest != turn {
            info!("Turn {} superseded by turn {} after {}", turn, latest, stage);
            return Err(AvatarError::Superseded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{LipSyncPlayer, PlaybackState, SimulatedAudio};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use twin_core::AnimationConfig;
    use twin_llm::{LLMError, ReplyResponse};
    use twin_spk::{
        AudioAsset, BlendShapes, CloneRequest, SpeechDescriptor, SpeechError, TimedAnimationEvent,
    };

    struct MockReply {
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl ReplyProvider for MockReply {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn reply(&self, request: ReplyRequest) -> twin_llm::Result<ReplyResponse> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(LLMError::Provider("503".to_string()));
            }
            Ok(ReplyResponse {
                content: format!("echo: {}", request.content),
                emotional_tone: Some("warm".to_string()),
                confidence: Some(0.8),
            })
        }

        async fn health(&self) -> twin_llm::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockVoice {
        fail_audio: bool,
        requests: Mutex<Vec<SynthesisRequest>>,
    }

    #[async_trait]
    impl VoiceEngine for MockVoice {
        async fn clone_voice(&self, _request: CloneRequest) -> Result<String, SpeechError> {
            Err(SpeechError::Api("unused".to_string()))
        }

        async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechDescriptor, SpeechError> {
            self.requests.lock().push(request.clone());
            Ok(SpeechDescriptor {
                audio_url: "/audio/1.mp3".to_string(),
                events: vec![
                    TimedAnimationEvent::new(0, 300, BlendShapes::new(0.8, 0.0, 0.0)),
                    TimedAnimationEvent::new(300, 600, BlendShapes::new(0.0, 0.5, 0.0)),
                    TimedAnimationEvent::new(600, 900, BlendShapes::new(0.3, 0.0, 0.0)),
                ],
                duration: Duration::from_millis(900),
                text: request.text.clone(),
            })
        }

        async fn fetch_audio(&self, audio_url: &str) -> Result<AudioAsset, SpeechError> {
            if self.fail_audio {
                return Err(SpeechError::Api("404".to_string()));
            }
            Ok(AudioAsset::new(audio_url, Bytes::from_static(b"ID3")))
        }

        async fn user_voice(&self, _user_id: &str) -> Result<Option<String>, SpeechError> {
            Ok(None)
        }

        async fn delete_user_voice(&self, _user_id: &str) -> Result<bool, SpeechError> {
            Ok(false)
        }

        async fn health(&self) -> Result<(), SpeechError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn setup(reply: MockReply, voice: Arc<MockVoice>) -> (ConversationPipeline, LipSyncPlayer) {
        let config = AnimationConfig {
            smoothing_rate: 12.0,
            tick_interval_ms: 10,
            settle_epsilon: 0.001,
        };
        let (player, handle) = LipSyncPlayer::new(Box::new(SimulatedAudio::new()), &config);
        let pipeline = ConversationPipeline::new(
            Arc::new(reply),
            voice,
            handle,
            StageTimeouts::default(),
            "text",
        );
        (pipeline, player)
    }

    fn ok_reply() -> MockReply {
        MockReply {
            fail: false,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_converse_schedules_playback() {
        let voice = Arc::new(MockVoice::default());
        let (pipeline, mut player) = setup(ok_reply(), voice.clone());
        let identity = IdentityHandle::new("u1", "a1", Some("v1".to_string()));

        let reply = pipeline.converse(&identity, "hello").await.unwrap();
        assert_eq!(reply.turn, 1);
        assert_eq!(reply.text, "echo: hello");
        assert_eq!(reply.emotional_tone.as_deref(), Some("warm"));
        assert_eq!(reply.viseme_count, 3);

        let requests = voice.requests.lock().clone();
        assert_eq!(requests[0].voice_id.as_deref(), Some("v1"));
        assert_eq!(requests[0].user_id, "u1");

        let frame = player.tick(Duration::from_millis(10));
        assert_eq!(frame.state, PlaybackState::Speaking);
    }

    #[tokio::test]
    async fn test_default_voice_sends_no_voice_id() {
        let voice = Arc::new(MockVoice::default());
        let (pipeline, _player) = setup(ok_reply(), voice.clone());
        let identity = IdentityHandle::new("u1", "a1", None);

        pipeline.converse(&identity, "hi").await.unwrap();
        assert_eq!(voice.requests.lock()[0].voice_id, None);
    }

    #[tokio::test]
    async fn test_reply_failure_skips_synthesis() {
        let voice = Arc::new(MockVoice::default());
        let reply = MockReply {
            fail: true,
            delay: Duration::ZERO,
        };
        let (pipeline, mut player) = setup(reply, voice.clone());
        let identity = IdentityHandle::new("u1", "a1", None);

        let err = pipeline.converse(&identity, "hello").await.unwrap_err();
        assert!(matches!(err, AvatarError::ReplyFailed(_)));
        assert!(voice.requests.lock().is_empty());
        assert_eq!(player.tick(Duration::from_millis(10)).state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_audio_failure_maps_to_stage() {
        let voice = Arc::new(MockVoice {
            fail_audio: true,
            ..MockVoice::default()
        });
        let (pipeline, mut player) = setup(ok_reply(), voice);
        let identity = IdentityHandle::new("u1", "a1", None);

        let err = pipeline.converse(&identity, "hello").await.unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::AudioFetch));
        assert_eq!(player.tick(Duration::from_millis(10)).state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (pipeline, _player) = setup(ok_reply(), Arc::new(MockVoice::default()));
        let identity = IdentityHandle::new("u1", "a1", None);
        let err = pipeline.converse(&identity, "   ").await.unwrap_err();
        assert!(matches!(err, AvatarError::ReplyFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout() {
        let reply = MockReply {
            fail: false,
            delay: Duration::from_secs(3600),
        };
        let (pipeline, _player) = setup(reply, Arc::new(MockVoice::default()));
        let identity = IdentityHandle::new("u1", "a1", None);
        let err = pipeline.converse(&identity, "hello").await.unwrap_err();
        assert!(matches!(err, AvatarError::ReplyFailed(ref m) if m.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overtaken_turn_is_superseded() {
        let reply = MockReply {
            fail: false,
            delay: Duration::from_millis(500),
        };
        let voice = Arc::new(MockVoice::default());
        let (pipeline, mut player) = setup(reply, voice.clone());
        let pipeline = Arc::new(pipeline);
        let identity = IdentityHandle::new("u1", "a1", None);

        let first = {
            let pipeline = pipeline.clone();
            let identity = identity.clone();
            tokio::spawn(async move { pipeline.converse(&identity, "first").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = pipeline.converse(&identity, "second").await.unwrap();

        let first = first.await.unwrap();
        assert!(matches!(first, Err(AvatarError::Superseded)));
        assert_eq!(second.turn, 2);
        assert_eq!(voice.requests.lock().len(), 1);

        player.tick(Duration::from_millis(10));
        assert_eq!(player.pending_events(), 2);
    }
}
