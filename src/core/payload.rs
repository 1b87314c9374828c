//! Final session payloads.

use serde::Serialize;

use super::event::StepRecord;
use super::result::SearchResult;

/// What a completed single-loop session returns.
#[derive(Debug, Clone, Serialize)]
pub struct SessionPayload {
    /// Full answer text, including any incomplete-research note.
    pub final_answer: String,
    /// Vetted results the answer was drawn from, in vetting order.
    pub citations: Vec<SearchResult>,
    /// Provenance log.
    pub thought_process: Vec<StepRecord>,
    /// Planning cycles run.
    pub attempts: usize,
    /// Whether the attempt ceiling cut research short.
    pub incomplete: bool,
}

/// One topic's contribution to a fan-out session.
#[derive(Debug, Clone, Serialize)]
pub struct TopicResearch {
    /// Topic label.
    pub topic: String,
    /// Vetted results for this topic.
    pub vetted_results: Vec<SearchResult>,
    /// Planning cycles run for this topic.
    pub attempts: usize,
    /// Whether the attempt ceiling ended this topic's research.
    pub incomplete: bool,
    /// Why the topic failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TopicResearch {
    /// An empty contribution for a topic that failed.
    pub fn failed(topic: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            vetted_results: Vec::new(),
            attempts: 0,
            incomplete: false,
            failure: Some(failure.into()),
        }
    }
}

/// What a completed fan-out session returns.
#[derive(Debug, Clone, Serialize)]
pub struct FanOutPayload {
    /// Topic labels, in research order.
    pub topics: Vec<String>,
    /// Per-topic research, in topic order.
    pub research: Vec<TopicResearch>,
    /// Full answer text.
    pub final_answer: String,
    /// Merged vetted results, grouped by topic.
    pub citations: Vec<SearchResult>,
    /// Merged provenance log.
    pub thought_process: Vec<StepRecord>,
    /// Planning cycles summed across topics.
    pub attempts: usize,
    /// Whether any topic hit the attempt ceiling.
    pub incomplete: bool,
}
