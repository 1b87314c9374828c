//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] and [`Embedder`]
//! implementations.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;
use crate::search::Embedder;

/// Generation and embedding handles for one configured provider.
#[derive(Clone)]
pub struct Providers {
    /// Chat completion backend shared by every agent.
    pub llm: Arc<dyn LlmProvider>,
    /// Query embedding backend for the retrieval gateway.
    pub embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("llm", &self.llm.name())
            .finish_non_exhaustive()
    }
}

/// Creates the providers named by the configuration.
///
/// # Supported Providers
///
/// - `"openai"` (default): `OpenAI`-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names.
pub fn create_providers(config: &AgentConfig) -> Result<Providers, AgentError> {
    match config.provider.as_str() {
        "openai" => {
            let provider = Arc::new(OpenAiProvider::new(config));
            Ok(Providers {
                llm: provider.clone(),
                embedder: provider,
            })
        }
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
