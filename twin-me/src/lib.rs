//! twin-me: the talking avatar
//!
//! Provides:
//! - Provisioning: photo and voice sample to an avatar identity
//! - Conversation turns: user text to a spoken agent reply
//! - Real-time lip sync: viseme scheduling and blend-shape smoothing
//!   against the audio clock

pub mod config;
pub mod conversation;
pub mod error;
pub mod model_host;
pub mod playback;
pub mod providers;
pub mod provisioning;
pub mod scheduler;
pub mod smoother;

pub use config::AvatarClientConfig;
pub use conversation::{AgentReply, ConversationPipeline};
pub use error::{AvatarError, PipelineStage};
pub use model_host::{AvatarAsset, InMemoryModelHost, ModelHost};
pub use playback::{
    AudioOutput, Frame, LipSyncPlayer, PlaybackCommand, PlaybackState, PlaybackStatus,
    PlayerHandle, SimulatedAudio,
};
pub use providers::{AvatarGenerator, AvatarStatus, HttpAvatarGenerator};
pub use provisioning::ProvisioningOrchestrator;
pub use scheduler::VisemeScheduler;
pub use smoother::BlendSmoother;
