//! Provisioning: photo and voice sample in, avatar identity out.

use crate::error::{run_stage, AvatarError, PipelineStage};
use crate::model_host::ModelHost;
use crate::providers::AvatarGenerator;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use twin_core::{ConversationConfig, IdentityHandle, StageTimeouts};
use twin_spk::{CloneRequest, VoiceEngine};

/// Runs the three provisioning stages in order: generate the avatar, load
/// its mesh, clone the voice.
///
/// The first failure ends provisioning. A mesh loaded before a later failure
/// is unloaded again, so no partial identity survives.
pub struct ProvisioningOrchestrator {
    generator: Arc<dyn AvatarGenerator>,
    host: Arc<dyn ModelHost>,
    voice: Arc<dyn VoiceEngine>,
    timeouts: StageTimeouts,
    conversation: ConversationConfig,
}

impl ProvisioningOrchestrator {
    pub fn new(
        generator: Arc<dyn AvatarGenerator>,
        host: Arc<dyn ModelHost>,
        voice: Arc<dyn VoiceEngine>,
        timeouts: StageTimeouts,
        conversation: ConversationConfig,
    ) -> Self {
        Self {
            generator,
            host,
            voice,
            timeouts,
            conversation,
        }
    }

    /// Provision a new identity.
    ///
    /// Empty voice samples are skipped; with none left the identity has no
    /// voice id and speaks with the service default.
    pub async fn provision(
        &self,
        user_id: &str,
        photo: Bytes,
        voice_samples: Vec<Bytes>,
    ) -> Result<IdentityHandle, AvatarError> {
        let candidate = IdentityHandle::new(user_id, "pending", None);
        candidate
            .validate()
            .map_err(|e| AvatarError::GenerationFailed(format!("Invalid user: {}", e)))?;

        info!("Provisioning avatar for user {}", user_id);

        let avatar_id = run_stage(
            PipelineStage::Generation,
            self.timeouts.generation(),
            self.generator.generate(user_id, photo),
        )
        .await?;
        debug!("Generation complete: {}", avatar_id);

        if let Err(e) = self.load_mesh(&avatar_id).await {
            self.discard(&avatar_id).await;
            return Err(e);
        }

        let samples: Vec<Bytes> = voice_samples.into_iter().filter(|s| !s.is_empty()).collect();
        let voice_id = if samples.is_empty() {
            info!("No voice sample for user {}, using default voice", user_id);
            None
        } else {
            let request = CloneRequest {
                user_id: user_id.to_string(),
                voice_name: self.conversation.voice_name_for(user_id),
                samples,
            };
            match run_stage(
                PipelineStage::VoiceClone,
                self.timeouts.voice_clone(),
                self.voice.clone_voice(request),
            )
            .await
            {
                Ok(voice_id) => Some(voice_id),
                Err(e) => {
                    warn!("Voice clone failed for user {}, discarding {}", user_id, avatar_id);
                    self.discard(&avatar_id).await;
                    return Err(e);
                }
            }
        };

        let identity = IdentityHandle::new(user_id, avatar_id, voice_id);
        if let Err(e) = identity.validate() {
            self.discard(identity.avatar_id()).await;
            return Err(AvatarError::at_stage(
                if identity.has_cloned_voice() {
                    PipelineStage::VoiceClone
                } else {
                    PipelineStage::Generation
                },
                format!("Invalid identity returned: {}", e),
            ));
        }

        info!("Provisioned {}", identity);
        Ok(identity)
    }

    async fn load_mesh(&self, avatar_id: &str) -> Result<(), AvatarError> {
        let asset = run_stage(
            PipelineStage::AssetLoad,
            self.timeouts.asset(),
            self.generator.fetch_asset(avatar_id),
        )
        .await?;
        run_stage(
            PipelineStage::AssetLoad,
            self.timeouts.asset(),
            self.host.load(asset),
        )
        .await
    }

    /// Unload the local mesh and delete the remote avatar. A failed delete
    /// is logged and otherwise ignored so the original error wins.
    async fn discard(&self, avatar_id: &str) {
        self.host.unload(avatar_id).await;
        let deleted = run_stage(
            PipelineStage::Generation,
            self.timeouts.generation(),
            self.generator.delete_avatar(avatar_id),
        )
        .await;
        if let Err(e) = deleted {
            warn!("Could not delete avatar {} from the service: {}", avatar_id, e);
        }
    }

    /// Accept a previously provisioned identity without any network calls.
    pub fn resume(&self, identity: IdentityHandle) -> Result<IdentityHandle, AvatarError> {
        identity
            .validate()
            .map_err(|e| AvatarError::Config(format!("Invalid identity: {}", e)))?;
        info!("Resuming {}", identity);
        Ok(identity)
    }

    /// Resume `existing` when present, otherwise provision from scratch.
    pub async fn provision_or_resume(
        &self,
        existing: Option<IdentityHandle>,
        user_id: &str,
        photo: Bytes,
        voice_samples: Vec<Bytes>,
    ) -> Result<IdentityHandle, AvatarError> {
        match existing {
            Some(identity) => self.resume(identity),
            None => self.provision(user_id, photo, voice_samples).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_host::{AvatarAsset, InMemoryModelHost};
    use crate::providers::AvatarStatus;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use twin_spk::{AudioAsset, SpeechDescriptor, SpeechError, SynthesisRequest};

    struct MockGenerator {
        fail_generate: bool,
        fail_fetch: bool,
        fail_delete: bool,
        delay: Duration,
        deleted: Arc<Mutex<Vec<String>>>,
    }

    impl MockGenerator {
        fn ok() -> Self {
            Self {
                fail_generate: false,
                fail_fetch: false,
                fail_delete: false,
                delay: Duration::ZERO,
                deleted: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl AvatarGenerator for MockGenerator {
        async fn generate(&self, _user_id: &str, _photo: Bytes) -> Result<String, AvatarError> {
            tokio::time::sleep(self.delay).await;
            if self.fail_generate {
                return Err(AvatarError::GenerationFailed("no face detected".to_string()));
            }
            Ok("avatar-1".to_string())
        }

        async fn fetch_asset(&self, avatar_id: &str) -> Result<AvatarAsset, AvatarError> {
            if self.fail_fetch {
                return Err(AvatarError::Playback("disk".to_string()));
            }
            Ok(AvatarAsset::new(avatar_id, Bytes::from_static(b"glTF....")))
        }

        async fn status(&self, avatar_id: &str) -> Result<AvatarStatus, AvatarError> {
            Ok(AvatarStatus {
                avatar_id: avatar_id.to_string(),
                status: "completed".to_string(),
                progress: 1.0,
                message: None,
            })
        }

        async fn delete_avatar(&self, avatar_id: &str) -> Result<(), AvatarError> {
            self.deleted.lock().push(avatar_id.to_string());
            if self.fail_delete {
                return Err(AvatarError::GenerationFailed("503".to_string()));
            }
            Ok(())
        }

        async fn health(&self) -> Result<(), AvatarError> {
            Ok(())
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }

    #[derive(Default)]
    struct MockVoice {
        fail_clone: bool,
        clone_calls: Mutex<Vec<CloneRequest>>,
    }

    #[async_trait]
    impl VoiceEngine for MockVoice {
        async fn clone_voice(&self, request: CloneRequest) -> Result<String, SpeechError> {
            self.clone_calls.lock().push(request);
            if self.fail_clone {
                return Err(SpeechError::Api("clone rejected".to_string()));
            }
            Ok("voice-1".to_string())
        }

        async fn synthesize(&self, _request: &SynthesisRequest) -> Result<SpeechDescriptor, SpeechError> {
            Err(SpeechError::Api("unused".to_string()))
        }

        async fn fetch_audio(&self, _audio_url: &str) -> Result<AudioAsset, SpeechError> {
            Err(SpeechError::Api("unused".to_string()))
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

    fn orchestrator(
        generator: MockGenerator,
        voice: Arc<MockVoice>,
        host: Arc<InMemoryModelHost>,
    ) -> ProvisioningOrchestrator {
        ProvisioningOrchestrator::new(
            Arc::new(generator),
            host,
            voice,
            StageTimeouts::default(),
            ConversationConfig::default(),
        )
    }

    fn photo() -> Bytes {
        Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0])
    }

    #[tokio::test]
    async fn test_provision_with_voice() {
        let host = Arc::new(InMemoryModelHost::new());
        let voice = Arc::new(MockVoice::default());
        let orchestrator = orchestrator(MockGenerator::ok(), voice.clone(), host.clone());

        let identity = orchestrator
            .provision("u1", photo(), vec![Bytes::from_static(b"RIFF")])
            .await
            .unwrap();
        assert_eq!(identity.avatar_id(), "avatar-1");
        assert_eq!(identity.voice_id(), Some("voice-1"));
        assert!(host.is_loaded("avatar-1"));

        let calls = voice.clone_calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].voice_name, "u1-voice");
    }

    #[tokio::test]
    async fn test_empty_sample_uses_default_voice() {
        let host = Arc::new(InMemoryModelHost::new());
        let voice = Arc::new(MockVoice::default());
        let orchestrator = orchestrator(MockGenerator::ok(), voice.clone(), host.clone());

        let identity = orchestrator
            .provision("u1", photo(), vec![Bytes::new()])
            .await
            .unwrap();
        assert_eq!(identity.voice_id(), None);
        assert!(voice.clone_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_clone_failure_unloads_mesh() {
        let host = Arc::new(InMemoryModelHost::new());
        let voice = Arc::new(MockVoice {
            fail_clone: true,
            ..MockVoice::default()
        });
        let generator = MockGenerator::ok();
        let deleted = generator.deleted.clone();
        let orchestrator = orchestrator(generator, voice, host.clone());

        let result = orchestrator
            .provision("u1", photo(), vec![Bytes::from_static(b"RIFF")])
            .await;
        assert!(matches!(result, Err(AvatarError::VoiceCloneFailed(_))));
        assert!(!host.is_loaded("avatar-1"));
        assert_eq!(host.loaded_count(), 0);
        assert_eq!(*deleted.lock(), vec!["avatar-1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_remote_delete_keeps_original_error() {
        let host = Arc::new(InMemoryModelHost::new());
        let generator = MockGenerator {
            fail_fetch: true,
            fail_delete: true,
            ..MockGenerator::ok()
        };
        let deleted = generator.deleted.clone();
        let orchestrator = orchestrator(generator, Arc::new(MockVoice::default()), host);

        let err = orchestrator
            .provision("u1", photo(), vec![])
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::AssetLoad));
        assert_eq!(deleted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_stops_early() {
        let host = Arc::new(InMemoryModelHost::new());
        let voice = Arc::new(MockVoice::default());
        let generator = MockGenerator {
            fail_generate: true,
            ..MockGenerator::ok()
        };
        let deleted = generator.deleted.clone();
        let orchestrator = orchestrator(generator, voice.clone(), host.clone());

        let result = orchestrator
            .provision("u1", photo(), vec![Bytes::from_static(b"RIFF")])
            .await;
        assert!(matches!(result, Err(AvatarError::GenerationFailed(_))));
        assert_eq!(host.loaded_count(), 0);
        assert!(voice.clone_calls.lock().is_empty());
        assert!(deleted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_maps_to_asset_stage() {
        let host = Arc::new(InMemoryModelHost::new());
        let generator = MockGenerator {
            fail_fetch: true,
            ..MockGenerator::ok()
        };
        let orchestrator = orchestrator(generator, Arc::new(MockVoice::default()), host);

        let err = orchestrator
            .provision("u1", photo(), vec![])
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::AssetLoad));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout() {
        let host = Arc::new(InMemoryModelHost::new());
        let generator = MockGenerator {
            delay: Duration::from_secs(3600),
            ..MockGenerator::ok()
        };
        let orchestrator = orchestrator(generator, Arc::new(MockVoice::default()), host);

        let err = orchestrator
            .provision("u1", photo(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, AvatarError::GenerationFailed(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_invalid_user_rejected() {
        let host = Arc::new(InMemoryModelHost::new());
        let orchestrator = orchestrator(MockGenerator::ok(), Arc::new(MockVoice::default()), host);
        let result = orchestrator.provision("", photo(), vec![]).await;
        assert!(matches!(result, Err(AvatarError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn test_resume_skips_network() {
        let host = Arc::new(InMemoryModelHost::new());
        let generator = MockGenerator {
            fail_generate: true,
            ..MockGenerator::ok()
        };
        let orchestrator = orchestrator(generator, Arc::new(MockVoice::default()), host);

        let existing = IdentityHandle::new("u1", "avatar-9", Some("voice-9".to_string()));
        let identity = orchestrator
            .provision_or_resume(Some(existing.clone()), "u1", Bytes::new(), vec![])
            .await
            .unwrap();
        assert_eq!(identity, existing);

        let invalid = IdentityHandle::new("u1", "", None);
        assert!(matches!(
            orchestrator.resume(invalid),
            Err(AvatarError::Config(_))
        ));
    }
}
