//! `OpenAI`-compatible backend built on `async-openai`.
//!
//! One client serves both agent completions and query embeddings. Any
//! endpoint speaking the `OpenAI` wire format (Azure `OpenAI`, local proxies)
//! works through the base URL override in [`AgentConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateEmbeddingRequestArgs, FinishReason, ResponseFormat, ResponseFormatJsonSchema,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, Completion, Role};
use crate::agent::provider::{FragmentStream, LlmProvider};
use crate::error::{AgentError, BackendError};
use crate::search::Embedder;

/// Completions and embeddings over the `OpenAI` API.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    embedding_model: String,
}

impl OpenAiProvider {
    /// Creates a client from the key, base URL and embedding model in `config`.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let mut openai = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(base_url) = &config.base_url {
            openai = openai.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai),
            embedding_model: config.embedding_model.clone(),
        }
    }

    fn wire_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
        let text = message.content.clone();
        match message.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(text),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(text),
                name: None,
            }),
        }
    }

    /// Translates a request. Schemas are sent as strict-free `json_schema`
    /// response formats; temperature 0 is left to the server default.
    fn wire_request(request: &ChatRequest, stream: bool) -> CreateChatCompletionRequest {
        let response_format = request.schema.as_ref().map(|s| ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: s.name.clone(),
                schema: Some(s.schema.clone()),
                strict: None,
            },
        });
        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Self::wire_message).collect(),
            temperature: (request.temperature != 0.0).then_some(request.temperature),
            max_completion_tokens: Some(request.max_tokens),
            stream: stream.then_some(true),
            response_format,
            ..Default::default()
        }
    }
}

fn request_error(e: &OpenAIError) -> AgentError {
    AgentError::ApiRequest {
        message: e.to_string(),
        status: None,
    }
}

fn embedding_error(e: &OpenAIError) -> BackendError {
    BackendError::Embedding {
        message: e.to_string(),
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("embedding_model", &self.embedding_model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, AgentError> {
        let response = self
            .client
            .chat()
            .create(Self::wire_request(request, false))
            .await
            .map_err(|e| request_error(&e))?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Ok(Completion::default());
        };
        if let Some(usage) = response.usage {
            debug!(
                model = %request.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }
        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            truncated: matches!(choice.finish_reason, Some(FinishReason::Length)),
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream, AgentError> {
        let chunks = self
            .client
            .chat()
            .create_stream(Self::wire_request(request, true))
            .await
            .map_err(|e| request_error(&e))?;

        Ok(Box::pin(chunks.map(|chunk| {
            chunk
                .map(|c| {
                    c.choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .unwrap_or_default()
                })
                .map_err(|e| AgentError::Stream {
                    message: e.to_string(),
                })
        })))
    }
}

#[async_trait]
impl Embedder for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(text)
            .build()
            .map_err(|e| embedding_error(&e))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| embedding_error(&e))?;

        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| BackendError::Embedding {
                message: format!("{} returned no vectors", self.embedding_model),
            })
    }
}
