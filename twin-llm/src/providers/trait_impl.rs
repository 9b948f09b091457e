use crate::config::{ReplyRequest, ReplyResponse};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ReplyProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Produce the agent's reply to one user message
    async fn reply(&self, request: ReplyRequest) -> Result<ReplyResponse>;

    /// Check the provider is reachable
    async fn health(&self) -> Result<()>;
}
