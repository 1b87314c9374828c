//! Provenance records and live session events.
//!
//! Two separate outputs leave a session:
//!
//! - the provenance log ("thought process"): an append-only `Vec<StepRecord>`
//!   owned by the session state and returned with the final payload;
//! - the live event stream: [`SessionEvent`]s pushed through an
//!   [`EventSink`] as they happen, for a transport layer to forward.
//!
//! Control flow never reads either of them.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::result::SourceSummary;
use super::verdict::{Decision, VerdictRepairs};

/// One step of a session's provenance log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepRecord {
    /// The question was split into research topics.
    TaxonomyExtraction {
        /// Topic labels, in research order.
        taxonomies: Vec<String>,
        /// Model's reasoning for the split.
        reasoning: String,
    },
    /// A planned query was run against the index.
    Retrieve {
        /// Topic, in fan-out mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        /// 1-based attempt number.
        attempt: usize,
        /// Search text issued.
        query: String,
        /// Planner's categorical filter (before exclusion is added).
        filter: Option<String>,
        /// Number of new results in the batch.
        result_count: usize,
        /// Where each result came from.
        results: Vec<SourceSummary>,
    },
    /// The index or embedding call failed; the attempt is consumed.
    RetrievalFailed {
        /// Topic, in fan-out mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        /// 1-based attempt number.
        attempt: usize,
        /// Search text issued.
        query: String,
        /// Planner's categorical filter.
        filter: Option<String>,
        /// Backend error message.
        error: String,
    },
    /// The reviewer classified the batch.
    Review {
        /// Topic, in fan-out mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        /// 1-based attempt number.
        attempt: usize,
        /// Reviewer's analysis.
        rationale: String,
        /// Reviewer's routing recommendation.
        decision: Decision,
        /// Results moved to the vetted set.
        valid: Vec<SourceSummary>,
        /// Results moved to the discarded set.
        invalid: Vec<SourceSummary>,
        /// Repairs applied to a malformed verdict.
        #[serde(skip_serializing_if = "Option::is_none")]
        repairs: Option<VerdictRepairs>,
    },
    /// The attempt ceiling forced finalization.
    MaxAttemptsReached {
        /// Topic, in fan-out mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        /// Attempts made.
        attempts: usize,
    },
    /// A fan-out topic failed and contributes no results.
    TopicFailed {
        /// Topic label.
        topic: String,
        /// Stage at which it failed.
        stage: String,
        /// Error message.
        error: String,
    },
    /// Per-topic results were merged.
    Consolidation {
        /// Number of topics researched.
        num_taxonomies: usize,
        /// Vetted-result count per topic, in topic order.
        results_per_taxonomy: Vec<TopicTally>,
    },
    /// The final answer.
    FinalAnswer {
        /// Full answer text.
        text: String,
        /// Whether the attempt ceiling cut research short.
        incomplete: bool,
    },
}

/// Vetted-result count for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicTally {
    /// Topic label.
    pub topic: String,
    /// Number of vetted results.
    pub vetted: usize,
}

/// An event on the live stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Short progress message ("Generating search query.").
    Status {
        /// Topic, in fan-out mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        /// Human-readable message.
        message: String,
    },
    /// A provenance step, mirrored as it is recorded.
    Step {
        /// The recorded step.
        record: StepRecord,
    },
    /// A fragment of the answer, in emission order.
    AnswerFragment {
        /// Fragment text.
        text: String,
    },
    /// The session produced its answer.
    Completed {
        /// Planning cycles run (summed across topics in fan-out).
        attempts: usize,
        /// Number of vetted results cited.
        citations: usize,
        /// Whether the answer is annotated as incomplete.
        incomplete: bool,
    },
    /// The session failed terminally.
    Failed {
        /// Stage that failed, if known.
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        /// Error message.
        message: String,
    },
}

/// Live stream of session events.
pub type EventStream = UnboundedReceiverStream<SessionEvent>;

/// Write end of the live event stream.
///
/// Cheap to clone; clones feed the same stream. Emission never blocks and
/// never fails: if nobody is listening the event is dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    /// A sink that discards every event.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Creates a connected sink and the stream it feeds.
    #[must_use]
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, UnboundedReceiverStream::new(rx))
    }

    /// Emits an event.
    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Emits a progress message.
    pub fn status(&self, topic: Option<&str>, message: impl Into<String>) {
        self.emit(SessionEvent::Status {
            topic: topic.map(str::to_string),
            message: message.into(),
        });
    }

    /// Mirrors a provenance step onto the live stream.
    pub fn step(&self, record: &StepRecord) {
        if self.tx.is_some() {
            self.emit(SessionEvent::Step {
                record: record.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_step_record_tagging() {
        let record = StepRecord::MaxAttemptsReached {
            topic: None,
            attempts: 3,
        };
        let json = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(json["type"], "max_attempts_reached");
        assert_eq!(json["attempts"], 3);
        assert!(json.get("topic").is_none());
    }

    #[test]
    fn test_session_event_wraps_step() {
        let event = SessionEvent::Step {
            record: StepRecord::FinalAnswer {
                text: "done".to_string(),
                incomplete: false,
            },
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["event_type"], "step");
        assert_eq!(json["record"]["type"], "final_answer");
    }

    #[tokio::test]
    async fn test_channel_preserves_order() {
        let (sink, stream) = EventSink::channel();
        for i in 0..3 {
            sink.emit(SessionEvent::AnswerFragment {
                text: i.to_string(),
            });
        }
        drop(sink);
        let texts: Vec<String> = stream
            .filter_map(|e| async move {
                match e {
                    SessionEvent::AnswerFragment { text } => Some(text),
                    _ => None,
                }
            })
            .collect()
            .await;
        assert_eq!(texts, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = EventSink::disabled();
        sink.status(None, "nobody listens");
    }
}
