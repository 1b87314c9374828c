//! The generation capability behind every agent.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::message::{ChatRequest, Completion};
use crate::error::AgentError;

/// Answer text as it is generated. An `Err` item ends the answer early.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// A chat-completion backend.
///
/// Implementations do one attempt per call; timeouts and retries are
/// applied by the calling agent.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Generates a complete reply.
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, AgentError>;

    /// Opens a reply stream. Fragments may be empty.
    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream, AgentError>;
}
