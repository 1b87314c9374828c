//! The research loop.
//!
//! One [`LoopController`] drives a question through bounded cycles of
//! PLAN → RETRIEVE → REVIEW, then routes to RETRY or FINALIZE. Each cycle
//! blocks on exactly three external calls; nothing else suspends.
//!
//! Failure policy:
//! - a retrieval failure consumes the attempt: the batch is empty, the
//!   reviewer still runs and the loop routes normally;
//! - a planner or reviewer failure (after bounded retries inside the
//!   agent) ends the session with [`SessionError::Generation`];
//! - a malformed verdict is repaired by the session state and logged.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::planner::Planner;
use super::reviewer::Reviewer;
use super::synthesizer::{EvidenceGroup, SynthesisRequest, Synthesizer, answer};
use crate::core::{
    Decision, EventSink, HistoryEntry, Route, SearchResult, SessionEvent, SessionPayload,
    SessionState, StepRecord, Termination,
};
use crate::error::{SessionError, Stage};
use crate::search::Retriever;

/// Longest question accepted, in bytes.
pub const MAX_QUESTION_LEN: usize = 10_000;

/// The injected collaborators of a research loop.
#[derive(Clone)]
pub struct Components {
    /// Query planner.
    pub planner: Arc<dyn Planner>,
    /// Retrieval gateway.
    pub retriever: Arc<dyn Retriever>,
    /// Relevance reviewer.
    pub reviewer: Arc<dyn Reviewer>,
    /// Answer synthesizer.
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components").finish_non_exhaustive()
    }
}

/// A finished research loop, before synthesis.
#[derive(Debug)]
pub struct Research {
    /// Final session state.
    pub state: SessionState,
    /// Why the loop stopped.
    pub termination: Termination,
    /// Whether the ceiling overrode a reviewer asking to keep searching.
    pub incomplete: bool,
}

/// Rejects empty or oversized questions.
///
/// # Errors
///
/// Returns [`SessionError::InvalidQuestion`].
pub fn validate_question(question: &str) -> Result<(), SessionError> {
    if question.trim().is_empty() {
        return Err(SessionError::InvalidQuestion {
            message: "question cannot be empty".to_string(),
        });
    }
    if question.len() > MAX_QUESTION_LEN {
        return Err(SessionError::InvalidQuestion {
            message: format!(
                "question exceeds maximum length ({} bytes, max {MAX_QUESTION_LEN})",
                question.len()
            ),
        });
    }
    Ok(())
}

/// Emits the terminal event for a finished session.
pub(crate) fn emit_outcome<T>(
    sink: &EventSink,
    outcome: &Result<T, SessionError>,
    summary: impl FnOnce(&T) -> (usize, usize, bool),
) {
    match outcome {
        Ok(payload) => {
            let (attempts, citations, incomplete) = summary(payload);
            sink.emit(SessionEvent::Completed {
                attempts,
                citations,
                incomplete,
            });
        }
        Err(e) => sink.emit(SessionEvent::Failed {
            stage: e.stage().map(|s| s.as_str().to_string()),
            message: e.to_string(),
        }),
    }
}

/// Drives the plan/retrieve/review loop for one question.
#[derive(Debug, Clone)]
pub struct LoopController {
    components: Components,
    max_attempts: usize,
}

impl LoopController {
    /// Creates a controller. A `max_attempts` of zero is treated as one.
    #[must_use]
    pub fn new(components: Components, max_attempts: usize) -> Self {
        Self {
            components,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The attempt ceiling.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// The synthesizer, shared with the fan-out coordinator.
    pub(crate) fn synthesizer(&self) -> &dyn Synthesizer {
        &*self.components.synthesizer
    }

    /// Answers `question`: research, then synthesize.
    ///
    /// Step records and answer fragments are mirrored on `sink` as they
    /// happen; a `completed` or `failed` event closes the stream.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on an invalid question or a generation
    /// failure. Finding nothing is not an error.
    pub async fn run(&self, question: &str, sink: &EventSink) -> Result<SessionPayload, SessionError> {
        let outcome = self.session(question, sink).await;
        emit_outcome(sink, &outcome, |p| (p.attempts, p.citations.len(), p.incomplete));
        if let Err(e) = &outcome {
            error!(stage = e.stage().map(|s| s.as_str()), error = %e, "session failed");
        }
        outcome
    }

    async fn session(&self, question: &str, sink: &EventSink) -> Result<SessionPayload, SessionError> {
        validate_question(question)?;
        let research = self.research(question, None, sink).await?;
        let incomplete = research.incomplete;
        let attempts = research.state.attempts();
        let (vetted, mut thought_process) = research.state.into_parts();

        sink.status(None, "Generating final answer.");
        let request = SynthesisRequest {
            question: question.to_string(),
            groups: vec![EvidenceGroup::unlabeled(vetted)],
            incomplete,
        };
        let final_answer = answer(self.synthesizer(), &request, sink)
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

        info!(attempts, incomplete, "session complete");
        Ok(SessionPayload {
            final_answer,
            citations: request.groups.into_iter().flat_map(|g| g.results).collect(),
            thought_process,
            attempts,
            incomplete,
        })
    }

    /// Runs the loop to termination without synthesizing.
    ///
    /// `topic` scopes planning and review in fan-out mode.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Generation`] if planning or review fails.
    #[allow(clippy::too_many_lines)]
    pub async fn research(
        &self,
        question: &str,
        topic: Option<&str>,
        sink: &EventSink,
    ) -> Result<Research, SessionError> {
        let mut state = SessionState::new(question, topic.map(str::to_string));
        let label = || topic.map(str::to_string);

        loop {
            // PLAN
            let attempt = state.begin_attempt();
            info!(attempt, topic, "planning search");
            sink.status(topic, "Generating search query.");
            let plan = {
                let history: Vec<HistoryEntry<'_>> = state.history().collect();
                self.components.planner.plan(question, topic, &history).await
            }
            .map_err(|source| SessionError::Generation {
                stage: Stage::Plan,
                source,
            })?;
            debug!(attempt, topic, query = %plan.search_query, filter = plan.filter.as_deref(), "planned");
            state.record_search(plan.search_query.clone(), plan.filter.clone());

            // RETRIEVE
            sink.status(topic, "Searching documents.");
            let retrieved = self
                .components
                .retriever
                .retrieve(&plan.search_query, state.processed_ids(), plan.filter.as_deref())
                .await;
            match retrieved {
                Ok(results) => {
                    state.set_batch(results);
                    let summaries: Vec<_> = state.current().iter().map(SearchResult::summary).collect();
                    let result_count = summaries.len();
                    info!(attempt, topic, result_count, "retrieved batch");
                    record(
                        &mut state,
                        sink,
                        StepRecord::Retrieve {
                            topic: label(),
                            attempt,
                            query: plan.search_query,
                            filter: plan.filter,
                            result_count,
                            results: summaries,
                        },
                    );
                }
                Err(failure) => {
                    warn!(attempt, topic, error = %failure, "retrieval failed, attempt consumed");
                    state.set_batch(Vec::new());
                    record(
                        &mut state,
                        sink,
                        StepRecord::RetrievalFailed {
                            topic: label(),
                            attempt,
                            query: plan.search_query,
                            filter: plan.filter,
                            error: failure.to_string(),
                        },
                    );
                }
            }

            // REVIEW
            sink.status(topic, "Reviewing results.");
            let verdict = {
                let history: Vec<HistoryEntry<'_>> =
                    state.history().filter(|h| h.review.is_some()).collect();
                self.components
                    .reviewer
                    .review(question, topic, state.current(), state.vetted(), &history)
                    .await
            }
            .map_err(|source| SessionError::Generation {
                stage: Stage::Review,
                source,
            })?;

            let applied = state.apply_review(verdict);
            if let Some(repairs) = &applied.repairs {
                warn!(attempt, topic, ?repairs, "repaired malformed reviewer verdict");
            }
            info!(
                attempt,
                topic,
                decision = %applied.decision,
                valid = applied.valid.len(),
                invalid = applied.invalid.len(),
                "review applied"
            );
            record(
                &mut state,
                sink,
                StepRecord::Review {
                    topic: label(),
                    attempt,
                    rationale: applied.rationale,
                    decision: applied.decision,
                    valid: applied.valid,
                    invalid: applied.invalid,
                    repairs: applied.repairs,
                },
            );
            if let Err(violation) = state.check_invariants() {
                error!(attempt, topic, %violation, "session state invariant violated");
            }

            // ROUTE
            match state.route(self.max_attempts) {
                Route::Retry => debug!(attempt, topic, "retrying"),
                Route::Finalize(termination) => {
                    let forced = termination == Termination::AttemptCeiling
                        && state.decisions().last() == Some(&Decision::Retry);
                    if forced {
                        warn!(attempts = attempt, topic, "attempt ceiling reached, finalizing");
                        record(
                            &mut state,
                            sink,
                            StepRecord::MaxAttemptsReached {
                                topic: label(),
                                attempts: attempt,
                            },
                        );
                    }
                    return Ok(Research {
                        state,
                        termination: if forced {
                            Termination::AttemptCeiling
                        } else {
                            Termination::Reviewer
                        },
                        incomplete: forced,
                    });
                }
            }
        }
    }
}

/// Appends to the provenance log and mirrors the step live.
fn record(state: &mut SessionState, sink: &EventSink, step: StepRecord) {
    sink.step(&step);
    state.log(step);
}
