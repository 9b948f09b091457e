//! twin-llm: client for the conversational reply service.

pub mod config;
pub mod error;
pub mod providers;

pub use config::{ReplyConfig, ReplyRequest, ReplyResponse};
pub use error::{LLMError, Result};
pub use providers::{HttpReplyProvider, ReplyProvider};
