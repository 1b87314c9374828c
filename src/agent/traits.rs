//! Agent trait definition.
//!
//! All agents (planner, reviewer, synthesizer, decomposer) implement this
//! trait, which gives the loop controller a uniform way to call them. Every
//! call is bounded by a per-call timeout and retried with exponential
//! backoff a fixed number of times; nothing is retried indefinitely.

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::config::RetryPolicy;
use super::message::{ChatMessage, ChatRequest, ResponseSchema};
pub use super::provider::FragmentStream;
use super::provider::LlmProvider;
use crate::error::AgentError;

/// A role played by one model: planner, reviewer, synthesizer or decomposer.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Role prompt.
    fn system_prompt(&self) -> &str;

    /// Schema for structured replies. `None` for free text.
    fn response_schema(&self) -> Option<ResponseSchema> {
        None
    }

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Generation cap.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Timeout and retry bounds for each call.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Builds the request for one user message.
    fn request(&self, user_msg: &str) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages: vec![
                ChatMessage::system(self.system_prompt()),
                ChatMessage::user(user_msg),
            ],
            temperature: self.temperature(),
            max_tokens: self.max_tokens(),
            schema: self.response_schema(),
        }
    }

    /// Opens a streaming completion for the given user message.
    ///
    /// Only opening the stream is retried; a stream that breaks off midway
    /// surfaces its error to the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the stream cannot be opened.
    async fn execute_stream(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<FragmentStream, AgentError> {
        let request = self.request(user_msg);
        let request = &request;
        with_retry(self.name(), self.retry_policy(), || async move {
            provider.stream(request).await
        })
        .await
    }
}

/// Executes an agent and parses its output as `T`.
///
/// Malformed output counts as a failed call and is retried under the
/// agent's policy like any transport error.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] (possibly wrapped in
/// [`AgentError::RetriesExhausted`]) if no call yields valid output.
pub async fn execute_structured<T>(
    agent: &dyn Agent,
    provider: &dyn LlmProvider,
    user_msg: &str,
) -> Result<T, AgentError>
where
    T: DeserializeOwned + Send,
{
    let request = agent.request(user_msg);
    let request = &request;
    let name = agent.name();
    with_retry(name, agent.retry_policy(), || async move {
        let completion = provider.complete(request).await?;
        if completion.truncated {
            warn!(agent = name, max_tokens = request.max_tokens, "structured reply hit the token cap");
        }
        parse_json(&completion.content)
    })
    .await
}

/// Parses model output as JSON, tolerating a surrounding code fence.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] if the content does not match `T`.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, AgentError> {
    let trimmed = content.trim();

    // Handle markdown code blocks
    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(json_str).map_err(|e| AgentError::ResponseParse {
        message: e.to_string(),
        content: content.to_string(),
    })
}

/// Runs `call` under `policy`: each try is bounded by the timeout, and
/// retryable failures are retried with doubling backoff.
///
/// # Errors
///
/// Returns the first non-retryable error, the only error when retries are
/// disabled, or [`AgentError::RetriesExhausted`] carrying the last one.
pub async fn with_retry<T, F, Fut>(
    agent: &'static str,
    policy: RetryPolicy,
    mut call: F,
) -> Result<T, AgentError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, AgentError>> + Send,
    T: Send,
{
    let mut attempt: u32 = 1;
    loop {
        let err = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(agent, attempt, "generation call succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => AgentError::Timeout {
                agent,
                after: policy.timeout,
            },
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt > policy.max_retries {
            if attempt == 1 {
                return Err(err);
            }
            return Err(AgentError::RetriesExhausted {
                agent,
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(agent, attempt, ?delay, error = %err, "generation call failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
