//! Relevance reviewer.
//!
//! Classifies the current batch as valid or invalid evidence and
//! recommends whether to retry or finalize. The returned verdict is raw
//! model output; the session state repairs it on application.

use std::sync::Arc;

use async_trait::async_trait;

use super::config::{AgentConfig, RetryPolicy};
use super::message::ResponseSchema;
use super::prompt::{PromptSet, build_reviewer_prompt, format_history};
use super::provider::LlmProvider;
use super::traits::{Agent, execute_structured};
use crate::core::{HistoryEntry, ReviewVerdict, SearchResult};
use crate::error::AgentError;

/// The review step of the research loop.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Reviews `batch` against the question.
    ///
    /// `vetted` is shown for context only and is never reclassified.
    /// `history` holds the reviewed searches before this one.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the generation capability fails.
    async fn review(
        &self,
        question: &str,
        topic: Option<&str>,
        batch: &[SearchResult],
        vetted: &[SearchResult],
        history: &[HistoryEntry<'_>],
    ) -> Result<ReviewVerdict, AgentError>;
}

/// LLM-backed [`Reviewer`].
pub struct ReviewerAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    policy: RetryPolicy,
}

impl ReviewerAgent {
    /// Creates a reviewer.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            provider,
            model: config.reviewer_model.clone(),
            max_tokens: config.reviewer_max_tokens,
            system_prompt: prompts.reviewer.clone(),
            policy: config.retry_policy(),
        }
    }
}

impl std::fmt::Debug for ReviewerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewerAgent")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for ReviewerAgent {
    fn name(&self) -> &'static str {
        "reviewer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn response_schema(&self) -> Option<ResponseSchema> {
        Some(ResponseSchema::of::<ReviewVerdict>("review_verdict"))
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Reviewer for ReviewerAgent {
    async fn review(
        &self,
        question: &str,
        topic: Option<&str>,
        batch: &[SearchResult],
        vetted: &[SearchResult],
        history: &[HistoryEntry<'_>],
    ) -> Result<ReviewVerdict, AgentError> {
        let user_msg = build_reviewer_prompt(
            question,
            topic,
            batch,
            vetted,
            &format_history(history.iter().copied()),
        );
        execute_structured(self, &*self.provider, &user_msg).await
    }
}
