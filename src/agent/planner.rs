//! Query planner.
//!
//! Given the question and the history of earlier searches and reviews,
//! produces the next search query and an optional categorical filter.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::config::{AgentConfig, RetryPolicy};
use super::message::ResponseSchema;
use super::prompt::{CategoryGuide, PromptSet, build_planner_prompt, format_history};
use super::provider::LlmProvider;
use super::traits::{Agent, execute_structured};
use crate::core::HistoryEntry;
use crate::error::AgentError;
use crate::search::filter;

/// How the planner phrases search queries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Short literal phrase expected to match source text.
    #[default]
    Keyword,
    /// A fabricated passage shaped like the expected answer, for the
    /// vector leg to match on.
    Hypothetical,
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "hypothetical" | "hyde" => Ok(Self::Hypothetical),
            other => Err(format!("unknown query mode: {other}")),
        }
    }
}

/// The planner's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPlan {
    /// Search text: a keyword phrase or a hypothetical passage.
    pub search_query: String,
    /// Boolean filter predicate, or null.
    #[serde(default)]
    pub filter: Option<String>,
}

/// The planning step of the research loop.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plans the next search.
    ///
    /// `history` holds every earlier search of this loop, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the generation capability fails.
    async fn plan(
        &self,
        question: &str,
        topic: Option<&str>,
        history: &[HistoryEntry<'_>],
    ) -> Result<SearchPlan, AgentError>;
}

/// LLM-backed [`Planner`].
pub struct PlannerAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    mode: QueryMode,
    system_prompt: String,
    policy: RetryPolicy,
}

impl PlannerAgent {
    /// Creates a planner; the system prompt is chosen by the configured
    /// query mode and extended with the category guide.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &AgentConfig,
        prompts: &PromptSet,
        guide: &CategoryGuide,
    ) -> Self {
        let base = match config.query_mode {
            QueryMode::Keyword => &prompts.planner_keyword,
            QueryMode::Hypothetical => &prompts.planner_hypothetical,
        };
        let system_prompt = if guide.is_empty() {
            base.clone()
        } else {
            format!("{base}\n\n{}", guide.render())
        };
        Self {
            provider,
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            mode: config.query_mode,
            system_prompt,
            policy: config.retry_policy(),
        }
    }

    /// The configured query mode.
    #[must_use]
    pub const fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Normalizes a raw plan; an empty query is malformed output.
    fn validate(plan: SearchPlan) -> Result<SearchPlan, AgentError> {
        let search_query = plan.search_query.trim().to_string();
        if search_query.is_empty() {
            return Err(AgentError::ResponseParse {
                message: "planner returned an empty search query".to_string(),
                content: String::new(),
            });
        }
        let filter = filter::normalize(plan.filter.as_deref()).map(str::to_string);
        Ok(SearchPlan {
            search_query,
            filter,
        })
    }
}

impl std::fmt::Debug for PlannerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannerAgent")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn name(&self) -> &'static str {
        "planner"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn response_schema(&self) -> Option<ResponseSchema> {
        Some(ResponseSchema::of::<SearchPlan>("search_plan"))
    }

    fn temperature(&self) -> f32 {
        match self.mode {
            QueryMode::Keyword => 0.0,
            QueryMode::Hypothetical => 0.3,
        }
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Planner for PlannerAgent {
    async fn plan(
        &self,
        question: &str,
        topic: Option<&str>,
        history: &[HistoryEntry<'_>],
    ) -> Result<SearchPlan, AgentError> {
        let user_msg = build_planner_prompt(question, topic, &format_history(history.iter().copied()));
        let plan: SearchPlan = execute_structured(self, &*self.provider, &user_msg).await?;
        Self::validate(plan)
    }
}
