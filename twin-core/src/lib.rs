//! twin-core: shared data model, errors and configuration for the avatar
//! conversational pipeline.

pub mod config;
pub mod error;
pub mod http;
pub mod types;

pub use config::{
    AnimationConfig, ConfigError, ConversationConfig, LoggingConfig, ServicesConfig,
    StageTimeouts, TwinConfig,
};
pub use error::{Error, Result};
pub use http::ServiceFailure;
pub use types::{ConversationTurn, IdentityHandle, Role};
