//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::agent::planner::QueryMode;
use crate::error::AgentError;

/// Default planning-cycle ceiling per loop.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Default maximum concurrently researched topics.
const DEFAULT_MAX_CONCURRENCY: usize = 5;
/// Default planner max tokens. Hypothetical passages need headroom.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 1024;
/// Default reviewer max tokens.
const DEFAULT_REVIEWER_MAX_TOKENS: u32 = 2048;
/// Default synthesizer max tokens.
const DEFAULT_SYNTHESIZER_MAX_TOKENS: u32 = 4096;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default max retries after the first failed call.
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base backoff between retries, in milliseconds.
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
/// Default chat model.
const DEFAULT_MODEL: &str = "gpt-4o";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for the query planner and topic decomposer.
    pub planner_model: String,
    /// Model for the relevance reviewer.
    pub reviewer_model: String,
    /// Model for the answer synthesizer.
    pub synthesizer_model: String,
    /// Model for query embeddings.
    pub embedding_model: String,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens for reviewer responses.
    pub reviewer_max_tokens: u32,
    /// Maximum tokens for synthesizer responses.
    pub synthesizer_max_tokens: u32,
    /// Planning cycles per loop before finalization is forced.
    pub max_attempts: usize,
    /// Query generation style.
    pub query_mode: QueryMode,
    /// Maximum topics researched concurrently in fan-out mode.
    pub max_concurrency: usize,
    /// Deadline for a single generation call.
    pub timeout: Duration,
    /// Retries after a failed generation call.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each subsequent one.
    pub retry_backoff: Duration,
    /// Directory containing prompt template files.
    ///
    /// When set, system prompts are loaded from markdown files in this
    /// directory, falling back to compiled-in defaults for any missing files.
    pub prompt_dir: Option<PathBuf>,
    /// JSON file describing the document categories for the planner.
    pub category_guide: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Retry policy derived from this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.timeout,
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
        }
    }
}

/// How a single generation call is bounded and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline per call.
    pub timeout: Duration,
    /// Retries after the first failure.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    planner_model: Option<String>,
    reviewer_model: Option<String>,
    synthesizer_model: Option<String>,
    embedding_model: Option<String>,
    planner_max_tokens: Option<u32>,
    reviewer_max_tokens: Option<u32>,
    synthesizer_max_tokens: Option<u32>,
    max_attempts: Option<usize>,
    query_mode: Option<QueryMode>,
    max_concurrency: Option<usize>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff: Option<Duration>,
    prompt_dir: Option<PathBuf>,
    category_guide: Option<PathBuf>,
}

/// First set variable among `keys`.
fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| std::env::var(k).ok())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_first(&[key]).and_then(|v| v.parse().ok())
}

impl AgentConfigBuilder {
    /// Fills fields not set explicitly from `OPENAI_*` / `RAG_*` variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        self.provider = self.provider.or_else(|| env_first(&["RAG_PROVIDER"]));
        self.api_key = self
            .api_key
            .or_else(|| env_first(&["OPENAI_API_KEY", "RAG_API_KEY"]));
        self.base_url = self
            .base_url
            .or_else(|| env_first(&["OPENAI_BASE_URL", "RAG_BASE_URL"]));

        self.planner_model = self.planner_model.or_else(|| env_first(&["RAG_PLANNER_MODEL"]));
        self.reviewer_model = self.reviewer_model.or_else(|| env_first(&["RAG_REVIEWER_MODEL"]));
        self.synthesizer_model = self
            .synthesizer_model
            .or_else(|| env_first(&["RAG_SYNTHESIZER_MODEL"]));
        self.embedding_model = self
            .embedding_model
            .or_else(|| env_first(&["RAG_EMBEDDING_MODEL"]));

        self.max_attempts = self.max_attempts.or_else(|| env_parse("RAG_MAX_ATTEMPTS"));
        self.query_mode = self.query_mode.or_else(|| env_parse("RAG_QUERY_MODE"));
        self.max_concurrency = self
            .max_concurrency
            .or_else(|| env_parse("RAG_MAX_CONCURRENCY"));

        self.prompt_dir = self
            .prompt_dir
            .or_else(|| env_first(&["RAG_PROMPT_DIR"]).map(PathBuf::from));
        self.category_guide = self
            .category_guide
            .or_else(|| env_first(&["RAG_CATEGORY_GUIDE"]).map(PathBuf::from));
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the reviewer model.
    #[must_use]
    pub fn reviewer_model(mut self, model: impl Into<String>) -> Self {
        self.reviewer_model = Some(model.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the synthesizer max tokens.
    #[must_use]
    pub const fn synthesizer_max_tokens(mut self, n: u32) -> Self {
        self.synthesizer_max_tokens = Some(n);
        self
    }

    /// Sets the planning-cycle ceiling.
    #[must_use]
    pub const fn max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Sets the query generation style.
    #[must_use]
    pub const fn query_mode(mut self, mode: QueryMode) -> Self {
        self.query_mode = Some(mode);
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the base retry backoff.
    #[must_use]
    pub const fn retry_backoff(mut self, delay: Duration) -> Self {
        self.retry_backoff = Some(delay);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the category guide file.
    #[must_use]
    pub fn category_guide(mut self, path: impl Into<PathBuf>) -> Self {
        self.category_guide = Some(path.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, and
    /// [`AgentError::Orchestration`] if `max_attempts` or
    /// `max_concurrency` is zero.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let max_attempts = positive("max_attempts", self.max_attempts, DEFAULT_MAX_ATTEMPTS)?;
        let max_concurrency = positive(
            "max_concurrency",
            self.max_concurrency,
            DEFAULT_MAX_CONCURRENCY,
        )?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            planner_model: self
                .planner_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            reviewer_model: self
                .reviewer_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            synthesizer_model: self
                .synthesizer_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            planner_max_tokens: self
                .planner_max_tokens
                .unwrap_or(DEFAULT_PLANNER_MAX_TOKENS),
            reviewer_max_tokens: self
                .reviewer_max_tokens
                .unwrap_or(DEFAULT_REVIEWER_MAX_TOKENS),
            synthesizer_max_tokens: self
                .synthesizer_max_tokens
                .unwrap_or(DEFAULT_SYNTHESIZER_MAX_TOKENS),
            max_attempts,
            query_mode: self.query_mode.unwrap_or_default(),
            max_concurrency,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff: self
                .retry_backoff
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)),
            prompt_dir: self.prompt_dir,
            category_guide: self.category_guide,
        })
    }
}

fn positive(name: &str, value: Option<usize>, default: usize) -> Result<usize, AgentError> {
    match value.unwrap_or(default) {
        0 => Err(AgentError::Orchestration {
            message: format!("{name} must be at least 1"),
        }),
        n => Ok(n),
    }
}
