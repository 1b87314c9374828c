//! Answer synthesis.
//!
//! [`SynthesizerAgent`] streams an answer grounded in the vetted results.
//! [`answer`] wraps any [`Synthesizer`] with the policy every answer
//! follows: empty evidence yields a fixed "nothing found" message without
//! a generation call, fragments are mirrored live as they arrive, and a
//! forced finalization appends the incomplete note.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, info};

use super::config::{AgentConfig, RetryPolicy};
use super::prompt::{PromptSet, build_synthesizer_prompt};
use super::provider::LlmProvider;
use super::traits::{Agent, FragmentStream};
use crate::core::{EventSink, SearchResult, SessionEvent};
use crate::error::AgentError;

/// Answer text used when no evidence survived review.
pub const NO_RESULTS_MESSAGE: &str =
    "No relevant information was found in the available documents to answer this question.";

/// Trailing note for answers whose research hit the attempt ceiling.
pub const INCOMPLETE_NOTE: &str = "\n\nNote: the search attempt limit was reached before the \
     evidence was judged sufficient, so this answer may be incomplete.";

/// Vetted results, optionally labeled with the topic they were found for.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceGroup {
    /// Topic label; `None` for a single-loop session.
    pub label: Option<String>,
    /// Vetted results in acceptance order.
    pub results: Vec<SearchResult>,
}

impl EvidenceGroup {
    /// Evidence from a single research loop.
    #[must_use]
    pub const fn unlabeled(results: Vec<SearchResult>) -> Self {
        Self {
            label: None,
            results,
        }
    }

    /// Evidence gathered for one topic.
    pub fn labeled(label: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            label: Some(label.into()),
            results,
        }
    }
}

/// Everything the synthesizer needs for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// The user's question.
    pub question: String,
    /// Evidence groups in presentation order.
    pub groups: Vec<EvidenceGroup>,
    /// Whether research was cut short by the attempt ceiling.
    pub incomplete: bool,
}

impl SynthesisRequest {
    /// Returns `true` if no group holds any result.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.results.is_empty())
    }

    /// Total number of vetted results across groups.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.groups.iter().map(|g| g.results.len()).sum()
    }
}

/// The synthesis step.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Opens a stream of answer fragments for non-empty evidence.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the stream cannot be opened.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<FragmentStream, AgentError>;
}

/// Produces the final answer text for `request`, emitting each fragment on
/// `sink` as it arrives.
///
/// # Errors
///
/// Returns [`AgentError`] if the stream cannot be opened or breaks off.
pub async fn answer(
    synthesizer: &dyn Synthesizer,
    request: &SynthesisRequest,
    sink: &EventSink,
) -> Result<String, AgentError> {
    let mut text = String::new();

    if request.is_empty() {
        info!("no vetted evidence, skipping generation");
        text.push_str(NO_RESULTS_MESSAGE);
        sink.emit(SessionEvent::AnswerFragment {
            text: NO_RESULTS_MESSAGE.to_string(),
        });
    } else {
        debug!(results = request.result_count(), groups = request.groups.len(), "synthesizing");
        let mut stream = synthesizer.synthesize(request).await?;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            text.push_str(&fragment);
            sink.emit(SessionEvent::AnswerFragment { text: fragment });
        }
    }

    if request.incomplete {
        text.push_str(INCOMPLETE_NOTE);
        sink.emit(SessionEvent::AnswerFragment {
            text: INCOMPLETE_NOTE.to_string(),
        });
    }
    Ok(text)
}

/// LLM-backed [`Synthesizer`].
pub struct SynthesizerAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    policy: RetryPolicy,
}

impl SynthesizerAgent {
    /// Creates a synthesizer.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            provider,
            model: config.synthesizer_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            system_prompt: prompts.synthesizer.clone(),
            policy: config.retry_policy(),
        }
    }
}

impl std::fmt::Debug for SynthesizerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesizerAgent")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.1
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Synthesizer for SynthesizerAgent {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<FragmentStream, AgentError> {
        let user_msg = build_synthesizer_prompt(&request.question, &request.groups);
        self.execute_stream(&*self.provider, &user_msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::stubs::ScriptedProvider;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSynthesizer {
        fragments: Vec<Result<String, AgentError>>,
        calls: AtomicUsize,
    }

    impl ScriptedSynthesizer {
        fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok((*f).to_string())).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Synthesizer for ScriptedSynthesizer {
        async fn synthesize(&self, _request: &SynthesisRequest) -> Result<FragmentStream, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<String, AgentError>> = self
                .fragments
                .iter()
                .map(|f| match f {
                    Ok(s) => Ok(s.clone()),
                    Err(e) => Err(AgentError::Stream {
                        message: e.to_string(),
                    }),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn request(results: Vec<SearchResult>, incomplete: bool) -> SynthesisRequest {
        SynthesisRequest {
            question: "What is the revenue?".to_string(),
            groups: vec![EvidenceGroup::unlabeled(results)],
            incomplete,
        }
    }

    async fn drain(stream: crate::core::EventStream) -> Vec<String> {
        stream
            .filter_map(|e| async move {
                match e {
                    SessionEvent::AnswerFragment { text } => Some(text),
                    _ => None,
                }
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_empty_evidence_skips_generation() {
        let synth = ScriptedSynthesizer::new(&["invented"]);
        let (sink, events) = EventSink::channel();
        let text = answer(&synth, &request(Vec::new(), false), &sink)
            .await
            .unwrap_or_default();
        drop(sink);
        assert_eq!(text, NO_RESULTS_MESSAGE);
        assert!(!text.contains("invented"));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
        assert_eq!(drain(events).await, vec![NO_RESULTS_MESSAGE.to_string()]);
    }

    #[tokio::test]
    async fn test_fragments_stream_in_order() {
        let synth = ScriptedSynthesizer::new(&["Revenue ", "", "was 5M."]);
        let (sink, events) = EventSink::channel();
        let results = vec![SearchResult::new("a", "revenue 5M", "a.pdf")];
        let text = answer(&synth, &request(results, false), &sink)
            .await
            .unwrap_or_default();
        drop(sink);
        assert_eq!(text, "Revenue was 5M.");
        assert_eq!(drain(events).await, vec!["Revenue ", "was 5M."]);
    }

    #[tokio::test]
    async fn test_forced_finalization_appends_note() {
        let synth = ScriptedSynthesizer::new(&["Partial answer."]);
        let results = vec![SearchResult::new("a", "x", "a.pdf")];
        let text = answer(&synth, &request(results, true), &EventSink::disabled())
            .await
            .unwrap_or_default();
        assert!(text.starts_with("Partial answer."));
        assert!(text.ends_with(INCOMPLETE_NOTE));

        let empty = answer(&synth, &request(Vec::new(), true), &EventSink::disabled())
            .await
            .unwrap_or_default();
        assert!(empty.starts_with(NO_RESULTS_MESSAGE));
        assert!(empty.ends_with(INCOMPLETE_NOTE));
    }

    #[tokio::test]
    async fn test_broken_stream_is_an_error() {
        let synth = ScriptedSynthesizer {
            fragments: vec![
                Ok("start".to_string()),
                Err(AgentError::Stream {
                    message: "connection reset".to_string(),
                }),
            ],
            calls: AtomicUsize::new(0),
        };
        let results = vec![SearchResult::new("a", "x", "a.pdf")];
        let result = answer(&synth, &request(results, false), &EventSink::disabled()).await;
        assert!(matches!(result, Err(AgentError::Stream { .. })));
    }

    #[tokio::test]
    async fn test_agent_streams_from_provider() {
        let provider = ScriptedProvider::new(&["A", "", "B"]);
        let config = AgentConfig::builder()
            .api_key("test")
            .synthesizer_model("gpt-4o-mini")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = SynthesizerAgent::new(provider.clone(), &config, &PromptSet::defaults());
        let results = vec![SearchResult::new("a", "revenue 5M", "a.pdf")];
        let text = answer(&agent, &request(results, false), &EventSink::disabled())
            .await
            .unwrap_or_default();
        assert_eq!(text, "AB");

        let seen = provider.requests();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].schema.is_none());
        assert_eq!(seen[0].model, "gpt-4o-mini");
        assert!(seen[0].user_content().is_some_and(|c| c.contains("revenue 5M")));
    }
}
