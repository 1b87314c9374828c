//! Request and reply types exchanged with an [`LlmProvider`].
//!
//! Every agent call is one system prompt plus one user message; agents never
//! carry a multi-turn conversation, so there is no assistant role.
//!
//! [`LlmProvider`]: super::provider::LlmProvider

use serde::{Deserialize, Serialize};

/// Who a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The agent's role prompt.
    System,
    /// The per-call payload: question, history, results.
    User,
}

/// One message of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender.
    pub role: Role,
    /// Text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// JSON schema a structured reply must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema name (letters, digits, underscores).
    pub name: String,
    /// JSON Schema document.
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    /// Builds the schema for `T` from its `JsonSchema` derive.
    #[must_use]
    pub fn of<T: schemars::JsonSchema>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: schemars::schema_for!(T).to_value(),
        }
    }
}

/// One generation call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// System prompt followed by the user message.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Generation cap.
    pub max_tokens: u32,
    /// Structured-output constraint; `None` means free text.
    pub schema: Option<ResponseSchema>,
}

impl ChatRequest {
    /// Text of the user message, if present.
    #[must_use]
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A non-streaming reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Generated text.
    pub content: String,
    /// The model stopped at the token cap.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReviewVerdict;

    #[test]
    fn test_user_content() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::system("role"), ChatMessage::user("question")],
            temperature: 0.0,
            max_tokens: 10,
            schema: None,
        };
        assert_eq!(request.user_content(), Some("question"));
        assert_eq!(request.messages[0].role, Role::System);
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::System).unwrap_or_default();
        assert_eq!(json, "\"system\"");
    }

    #[test]
    fn test_response_schema_lists_wire_fields() {
        let schema = ResponseSchema::of::<ReviewVerdict>("review_verdict");
        assert_eq!(schema.name, "review_verdict");
        let props = &schema.schema["properties"];
        assert!(props.get("thought_process").is_some());
        assert!(props.get("valid_results").is_some());
        assert!(props.get("invalid_results").is_some());
        assert!(props.get("decision").is_some());
    }
}
