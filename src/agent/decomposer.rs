//! Topic decomposer for the fan-out variant.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::{AgentConfig, RetryPolicy};
use super::message::ResponseSchema;
use super::prompt::{PromptSet, build_decomposer_prompt};
use super::provider::LlmProvider;
use super::traits::{Agent, execute_structured};
use crate::error::AgentError;

/// Fewest topics a decomposition is expected to yield. Fewer are
/// researched anyway, with a warning.
pub const MIN_TOPICS: usize = 2;

/// Most topics researched for one question; extras are dropped.
pub const MAX_TOPICS: usize = 5;

/// Research topics extracted from a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaxonomyExtraction {
    /// Distinct research topics, 2 to 5 of them.
    pub taxonomies: Vec<String>,
    /// Brief explanation of the split.
    #[serde(default)]
    pub reasoning: String,
}

impl TaxonomyExtraction {
    /// Trims labels, drops blanks and repeats (case-insensitively), and
    /// keeps at most [`MAX_TOPICS`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ResponseParse`] if no usable topic remains.
    pub fn normalized(self) -> Result<Self, AgentError> {
        let mut topics: Vec<String> = Vec::new();
        for raw in self.taxonomies {
            let topic = raw.trim();
            if topic.is_empty() || topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
                continue;
            }
            topics.push(topic.to_string());
        }
        if topics.is_empty() {
            return Err(AgentError::ResponseParse {
                message: "decomposer returned no topics".to_string(),
                content: String::new(),
            });
        }
        if topics.len() < MIN_TOPICS {
            warn!(
                returned = topics.len(),
                expected = MIN_TOPICS,
                "fewer topics than expected, researching as returned"
            );
        }
        if topics.len() > MAX_TOPICS {
            warn!(returned = topics.len(), kept = MAX_TOPICS, "too many topics, truncating");
            topics.truncate(MAX_TOPICS);
        }
        Ok(Self {
            taxonomies: topics,
            reasoning: self.reasoning,
        })
    }
}

/// Splits a question into research topics.
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Extracts the topics to research for `question`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if generation fails or yields no topic.
    async fn decompose(&self, question: &str) -> Result<TaxonomyExtraction, AgentError>;
}

/// LLM-backed [`Decomposer`].
pub struct DecomposerAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system_prompt: String,
    policy: RetryPolicy,
}

impl DecomposerAgent {
    /// Creates a decomposer; it runs on the planner's model.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            provider,
            model: config.planner_model.clone(),
            system_prompt: prompts.decomposer.clone(),
            policy: config.retry_policy(),
        }
    }
}

impl std::fmt::Debug for DecomposerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecomposerAgent")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for DecomposerAgent {
    fn name(&self) -> &'static str {
        "decomposer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn response_schema(&self) -> Option<ResponseSchema> {
        Some(ResponseSchema::of::<TaxonomyExtraction>("taxonomy_extraction"))
    }

    fn max_tokens(&self) -> u32 {
        1024
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Decomposer for DecomposerAgent {
    async fn decompose(&self, question: &str) -> Result<TaxonomyExtraction, AgentError> {
        let user_msg = build_decomposer_prompt(question);
        let raw: TaxonomyExtraction = execute_structured(self, &*self.provider, &user_msg).await?;
        raw.normalized()
    }
}
