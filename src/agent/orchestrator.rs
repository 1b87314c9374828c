//! Fan-out/collect over research topics.
//!
//! Decomposes the question into topics, runs one independent research
//! loop per topic concurrently, merges the per-topic evidence and
//! synthesizes once over the merged view with topic labels preserved.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::controller::{LoopController, Research, emit_outcome, validate_question};
use super::decomposer::Decomposer;
use super::synthesizer::{EvidenceGroup, SynthesisRequest, answer};
use crate::core::{EventSink, FanOutPayload, StepRecord, TopicResearch, TopicTally};
use crate::error::{SessionError, Stage};

/// Why one topic produced no research.
#[derive(Debug)]
struct TopicFailure {
    stage: &'static str,
    error: String,
}

impl From<SessionError> for TopicFailure {
    fn from(e: SessionError) -> Self {
        Self {
            stage: e.stage().map_or("research", Stage::as_str),
            error: e.to_string(),
        }
    }
}

/// Runs the multi-topic variant of a session.
#[derive(Clone)]
pub struct FanOutCoordinator {
    decomposer: Arc<dyn Decomposer>,
    controller: LoopController,
    max_concurrency: usize,
}

impl FanOutCoordinator {
    /// Creates a coordinator running at most `max_concurrency` topic loops
    /// at once (at least one).
    #[must_use]
    pub fn new(
        decomposer: Arc<dyn Decomposer>,
        controller: LoopController,
        max_concurrency: usize,
    ) -> Self {
        Self {
            decomposer,
            controller,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Answers `question` by researching each of its topics.
    ///
    /// A topic whose loop fails contributes an empty result set and a
    /// `topic_failed` step; its siblings are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the question is invalid, decomposition
    /// or synthesis fails, or every topic fails.
    pub async fn run(&self, question: &str, sink: &EventSink) -> Result<FanOutPayload, SessionError> {
        let outcome = self.session(question, sink).await;
        emit_outcome(sink, &outcome, |p| (p.attempts, p.citations.len(), p.incomplete));
        if let Err(e) = &outcome {
            error!(stage = e.stage().map(|s| s.as_str()), error = %e, "fan-out session failed");
        }
        outcome
    }

    async fn session(&self, question: &str, sink: &EventSink) -> Result<FanOutPayload, SessionError> {
        validate_question(question)?;

        sink.status(None, "Extracting research topics.");
        let extraction = self
            .decomposer
            .decompose(question)
            .await
            .map_err(|source| SessionError::Generation {
                stage: Stage::Decompose,
                source,
            })?;
        let topics = extraction.taxonomies;
        info!(count = topics.len(), ?topics, "question decomposed");

        let mut thought_process = Vec::new();
        let record = StepRecord::TaxonomyExtraction {
            taxonomies: topics.clone(),
            reasoning: extraction.reasoning,
        };
        sink.step(&record);
        thought_process.push(record);

        let outcomes = self.fan_out(question, &topics, sink).await;

        let mut research = Vec::with_capacity(topics.len());
        for (topic, outcome) in topics.iter().zip(outcomes) {
            match outcome {
                Ok(done) => {
                    let attempts = done.state.attempts();
                    let (vetted, records) = done.state.into_parts();
                    thought_process.extend(records);
                    research.push(TopicResearch {
                        topic: topic.clone(),
                        vetted_results: vetted,
                        attempts,
                        incomplete: done.incomplete,
                        failure: None,
                    });
                }
                Err(failure) => {
                    warn!(topic = %topic, stage = failure.stage, error = %failure.error, "topic failed");
                    let record = StepRecord::TopicFailed {
                        topic: topic.clone(),
                        stage: failure.stage.to_string(),
                        error: failure.error.clone(),
                    };
                    sink.step(&record);
                    thought_process.push(record);
                    research.push(TopicResearch::failed(topic.clone(), failure.error));
                }
            }
        }

        if research.iter().all(|r| r.failure.is_some()) {
            return Err(SessionError::TopicsFailed {
                count: research.len(),
            });
        }

        let (consolidation, groups) = merge(&research);
        sink.step(&consolidation);
        thought_process.push(consolidation);

        let incomplete = research.iter().any(|r| r.incomplete);
        let attempts = research.iter().map(|r| r.attempts).sum();

        sink.status(None, "Generating final answer.");
        let request = SynthesisRequest {
            question: question.to_string(),
            groups,
            incomplete,
        };
        let final_answer = answer(self.controller.synthesizer(), &request, sink)
            .await
            .map_err(|source| SessionError::Generation {
                stage: Stage::Synthesize,
                source,
            })?;

        let record = StepRecord::FinalAnswer {
            text: final_answer.clone(),
            incomplete,
        };
        sink.step(&record);
        thought_process.push(record);

        info!(topics = topics.len(), attempts, incomplete, "fan-out session complete");
        Ok(FanOutPayload {
            topics,
            final_answer,
            citations: request.groups.into_iter().flat_map(|g| g.results).collect(),
            research,
            thought_process,
            attempts,
            incomplete,
        })
    }

    /// Runs one loop per topic, bounded by the semaphore, and joins them
    /// all. Outcomes are in topic order.
    async fn fan_out(
        &self,
        question: &str,
        topics: &[String],
        sink: &EventSink,
    ) -> Vec<Result<Research, TopicFailure>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(topics.len());

        for topic in topics {
            let sem = Arc::clone(&semaphore);
            let controller = self.controller.clone();
            let question = question.to_string();
            let topic = topic.clone();
            let sink = sink.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.map_err(|e| TopicFailure {
                    stage: "schedule",
                    error: format!("semaphore acquire failed: {e}"),
                })?;
                controller
                    .research(&question, Some(&topic), &sink)
                    .await
                    .map_err(TopicFailure::from)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.unwrap_or_else(|e| {
                Err(TopicFailure {
                    stage: "join",
                    error: format!("task join failed: {e}"),
                })
            }));
        }
        outcomes
    }
}

impl std::fmt::Debug for FanOutCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutCoordinator")
            .field("max_attempts", &self.controller.max_attempts())
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

/// Joins per-topic evidence by label, in topic order, without filtering
/// or re-ranking.
#[must_use]
pub fn merge(research: &[TopicResearch]) -> (StepRecord, Vec<EvidenceGroup>) {
    let tallies = research
        .iter()
        .map(|r| TopicTally {
            topic: r.topic.clone(),
            vetted: r.vetted_results.len(),
        })
        .collect();
    let groups = research
        .iter()
        .map(|r| EvidenceGroup::labeled(r.topic.clone(), r.vetted_results.clone()))
        .collect();
    (
        StepRecord::Consolidation {
            num_taxonomies: research.len(),
            results_per_taxonomy: tallies,
        },
        groups,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::controller::Components;
    use crate::agent::stubs::{
        Batch, EchoRetriever, RecordingSynthesizer, StubDecomposer, StubPlanner, StubRetriever,
        StubReviewer, result,
    };
    use crate::agent::synthesizer::INCOMPLETE_NOTE;
    use crate::core::{Decision, SearchResult, SessionEvent};
    use crate::error::RetrievalFailure;
    use crate::search::Retriever;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn coordinator(
        topics: Option<Vec<&'static str>>,
        planner: StubPlanner,
        retriever: Arc<dyn Retriever>,
        reviewer: StubReviewer,
        max_concurrency: usize,
    ) -> (FanOutCoordinator, Arc<RecordingSynthesizer>) {
        let synthesizer = Arc::new(RecordingSynthesizer::default());
        let controller = LoopController::new(
            Components {
                planner: Arc::new(planner),
                retriever,
                reviewer: Arc::new(reviewer),
                synthesizer: synthesizer.clone(),
            },
            3,
        );
        let coordinator = FanOutCoordinator::new(
            Arc::new(StubDecomposer { topics }),
            controller,
            max_concurrency,
        );
        (coordinator, synthesizer)
    }

    #[tokio::test]
    async fn test_failed_topic_contributes_empty_set() {
        let (coordinator, synthesizer) = coordinator(
            Some(vec!["A", "B", "C"]),
            StubPlanner::failing_for("B"),
            Arc::new(EchoRetriever),
            StubReviewer::all_valid(Decision::Finalize),
            5,
        );
        let payload = coordinator
            .run("Compare A, B and C", &EventSink::disabled())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(payload.topics, vec!["A", "B", "C"]);
        assert_eq!(payload.research[0].vetted_results.len(), 2);
        assert!(payload.research[1].vetted_results.is_empty());
        assert!(payload.research[1].failure.is_some());
        assert_eq!(payload.research[2].vetted_results.len(), 2);
        assert_eq!(payload.citations.len(), 4);
        assert_eq!(payload.attempts, 2);

        assert!(payload.thought_process.iter().any(|s| matches!(
            s,
            StepRecord::TopicFailed { topic, stage, .. } if topic == "B" && stage == "plan"
        )));
        assert!(payload.thought_process.iter().any(|s| matches!(
            s,
            StepRecord::Consolidation { num_taxonomies: 3, results_per_taxonomy }
                if results_per_taxonomy.iter().map(|t| t.vetted).collect::<Vec<_>>() == vec![2, 0, 2]
        )));

        let requests = synthesizer.requests();
        assert_eq!(requests.len(), 1);
        let labels: Vec<_> = requests[0].groups.iter().map(|g| g.label.as_deref()).collect();
        assert_eq!(labels, vec![Some("A"), Some("B"), Some("C")]);
        assert!(requests[0].groups[1].results.is_empty());
    }

    #[tokio::test]
    async fn test_topics_do_not_share_exclusions() {
        let retriever = Arc::new(StubRetriever::new(vec![Batch::Ids(vec!["shared"])]));
        let (coordinator, _) = coordinator(
            Some(vec!["A", "B"]),
            StubPlanner::default(),
            retriever.clone(),
            StubReviewer::all_valid(Decision::Finalize),
            5,
        );
        let payload = coordinator
            .run("q", &EventSink::disabled())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(payload.research[0].vetted_results, vec![result("shared")]);
        assert_eq!(payload.research[1].vetted_results, vec![result("shared")]);
        let excluded = retriever.excluded.lock().map(|e| e.clone()).unwrap_or_default();
        assert!(excluded.iter().all(BTreeSet::is_empty));
    }

    #[tokio::test]
    async fn test_forced_topic_marks_answer_incomplete() {
        let (coordinator, _) = coordinator(
            Some(vec!["A", "B"]),
            StubPlanner::default(),
            Arc::new(EchoRetriever),
            StubReviewer::all_valid(Decision::Retry),
            5,
        );
        let payload = coordinator
            .run("q", &EventSink::disabled())
            .await
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(payload.incomplete);
        assert!(payload.research.iter().all(|r| r.incomplete && r.attempts == 3));
        assert_eq!(payload.attempts, 6);
        assert!(payload.final_answer.ends_with(INCOMPLETE_NOTE));
    }

    #[tokio::test]
    async fn test_decomposition_failure_is_terminal() {
        let (coordinator, synthesizer) = coordinator(
            None,
            StubPlanner::default(),
            Arc::new(EchoRetriever),
            StubReviewer::all_valid(Decision::Finalize),
            5,
        );
        let (sink, events) = EventSink::channel();
        let outcome = coordinator.run("q", &sink).await;
        drop(sink);
        assert!(matches!(
            outcome,
            Err(SessionError::Generation { stage: Stage::Decompose, .. })
        ));
        assert!(synthesizer.requests().is_empty());
        let events: Vec<SessionEvent> = events.collect().await;
        assert!(matches!(
            events.last(),
            Some(SessionEvent::Failed { stage: Some(s), .. }) if s == "decompose"
        ));
    }

    #[tokio::test]
    async fn test_all_topics_failing_is_terminal() {
        let (coordinator, synthesizer) = coordinator(
            Some(vec!["A", "B"]),
            StubPlanner {
                fail_always: true,
                ..StubPlanner::default()
            },
            Arc::new(EchoRetriever),
            StubReviewer::all_valid(Decision::Finalize),
            5,
        );
        let outcome = coordinator.run("q", &EventSink::disabled()).await;
        assert!(matches!(outcome, Err(SessionError::TopicsFailed { count: 2 })));
        assert!(synthesizer.requests().is_empty());
    }

    /// Tracks the peak number of concurrent retrievals.
    #[derive(Default)]
    struct ProbeRetriever {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Retriever for ProbeRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            _excluded: &BTreeSet<String>,
            _filter: Option<&str>,
        ) -> Result<Vec<SearchResult>, RetrievalFailure> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let probe = Arc::new(ProbeRetriever::default());
        let (coordinator, _) = coordinator(
            Some(vec!["A", "B", "C", "D"]),
            StubPlanner::default(),
            probe.clone(),
            StubReviewer::all_valid(Decision::Finalize),
            2,
        );
        let payload = coordinator.run("q", &EventSink::disabled()).await;
        assert!(payload.is_ok());
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_merge_preserves_order_and_content() {
        let research = vec![
            TopicResearch {
                topic: "Pricing".to_string(),
                vetted_results: vec![result("p1"), result("p2")],
                attempts: 1,
                incomplete: false,
                failure: None,
            },
            TopicResearch::failed("Performance", "planner timed out"),
        ];
        let (record, groups) = merge(&research);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label.as_deref(), Some("Pricing"));
        assert_eq!(groups[0].results, vec![result("p1"), result("p2")]);
        assert!(groups[1].results.is_empty());
        assert!(matches!(
            record,
            StepRecord::Consolidation { num_taxonomies: 2, .. }
        ));
    }
}
