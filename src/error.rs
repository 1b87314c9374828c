//! Error types for agentic-rag.
//!
//! The taxonomy mirrors the failure classes of the retrieval loop:
//!
//! - [`AgentError`]: the generation capability failed (planner, reviewer,
//!   decomposer or synthesizer call). Terminal for a session once retries
//!   are exhausted.
//! - [`RetrievalFailure`]: the search or embedding backend failed. The loop
//!   controller records it as a consumed attempt and keeps going.
//! - [`SessionError`]: the distinguishable terminal failure handed to the
//!   caller of a whole session.
//! - [`CommandError`]: CLI-level failures.

use std::time::Duration;

use thiserror::Error;

/// Result type alias used by the CLI layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the command-line front end.
#[derive(Debug, Error)]
pub enum Error {
    /// A session ended in a terminal failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Agent configuration or provider setup failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Search backend setup failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A CLI command failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the generation capability.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured.
    #[error("API key missing: set OPENAI_API_KEY or RAG_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is not known.
    #[error("unsupported LLM provider: {name}")]
    UnsupportedProvider {
        /// Provider name as configured.
        name: String,
    },

    /// The provider rejected or failed the request.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// A streaming response broke off.
    #[error("stream error: {message}")]
    Stream {
        /// Provider error message.
        message: String,
    },

    /// The model's output did not match the requested structure.
    #[error("malformed model response: {message}")]
    ResponseParse {
        /// What was wrong with the response.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// A single generation call exceeded its deadline.
    #[error("{agent} call timed out after {after:?}")]
    Timeout {
        /// Agent that issued the call.
        agent: &'static str,
        /// Configured deadline.
        after: Duration,
    },

    /// Every retry of a generation call failed.
    #[error("{agent} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Agent that issued the call.
        agent: &'static str,
        /// Number of calls made.
        attempts: u32,
        /// The last error observed.
        #[source]
        last: Box<AgentError>,
    },

    /// Coordination failure (invalid configuration, task join error).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Description of the failure.
        message: String,
    },
}

impl AgentError {
    /// Returns `true` when retrying the same call could succeed.
    ///
    /// Configuration errors never heal on retry; transport, timeout and
    /// malformed-output errors may.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ApiRequest { .. }
                | Self::Stream { .. }
                | Self::ResponseParse { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Failure inside a search or embedding backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The embedding capability failed.
    #[error("embedding failed: {message}")]
    Embedding {
        /// Provider error message.
        message: String,
    },

    /// The index request failed.
    #[error("search request failed: {message}")]
    Request {
        /// Transport or service message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The index answered with an unexpected payload.
    #[error("invalid search response: {message}")]
    Response {
        /// What was wrong with the response.
        message: String,
    },

    /// The backend cannot evaluate a filter predicate.
    #[error("unsupported filter predicate: {predicate}")]
    UnsupportedFilter {
        /// The offending clause.
        predicate: String,
    },

    /// Missing or invalid backend configuration.
    #[error("search configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// A failed retrieval, with the query and filter that caused it.
#[derive(Debug, Error)]
#[error("retrieval failed for query {query:?} (filter: {filter:?}): {source}")]
pub struct RetrievalFailure {
    /// The search text that was issued.
    pub query: String,
    /// The composed filter expression sent to the index.
    pub filter: Option<String>,
    /// Underlying backend error.
    #[source]
    pub source: BackendError,
}

/// Pipeline stage at which a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Topic decomposition (fan-out only).
    Decompose,
    /// Query planning.
    Plan,
    /// Relevance review.
    Review,
    /// Answer synthesis.
    Synthesize,
}

impl Stage {
    /// Returns the stage label used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decompose => "decompose",
            Self::Plan => "plan",
            Self::Review => "review",
            Self::Synthesize => "synthesize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a whole session.
///
/// Never merged into an answer: a caller can always tell "found nothing"
/// (an `Ok` payload) from "the pipeline broke" (this error).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The question was rejected before any work started.
    #[error("invalid question: {message}")]
    InvalidQuestion {
        /// Why the question was rejected.
        message: String,
    },

    /// Every fan-out topic failed, so there is nothing to synthesize from.
    #[error("all {count} research topics failed")]
    TopicsFailed {
        /// Number of topics attempted.
        count: usize,
    },

    /// The generation capability failed at the given stage.
    #[error("session failed during {stage}: {source}")]
    Generation {
        /// Stage that failed.
        stage: Stage,
        /// Underlying generation error.
        #[source]
        source: AgentError,
    },
}

impl SessionError {
    /// Returns the failing stage, if the failure came from a generation call.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Generation { stage, .. } => Some(*stage),
            Self::InvalidQuestion { .. } | Self::TopicsFailed { .. } => None,
        }
    }
}

/// CLI command failures.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command execution failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Output serialization failed.
    #[error("output format error: {0}")]
    OutputFormat(String),

    /// Invalid argument value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
