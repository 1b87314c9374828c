//! Per-question session state.
//!
//! A [`SessionState`] is owned by exactly one loop controller for the
//! lifetime of one question (or one fan-out topic). All mutation goes
//! through the methods below, each of which keeps the invariants:
//!
//! - `attempts == searches.len() == reviews.len() == decisions.len()`
//!   between cycles;
//! - vetted and discarded ids are disjoint;
//! - `processed_ids ⊇ ids(vetted) ∪ ids(discarded)`.

use std::collections::{BTreeSet, HashSet};

use tracing::warn;

use super::event::StepRecord;
use super::result::{SearchResult, SourceSummary};
use super::verdict::{Classification, Decision, ReviewVerdict};

/// One planned search: the query and the planner's optional filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAttempt {
    /// Search text.
    pub query: String,
    /// Categorical filter expression, as produced by the planner.
    pub filter: Option<String>,
}

/// A past search paired with the review that followed it.
#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry<'a> {
    /// The search.
    pub search: &'a SearchAttempt,
    /// The reviewer's rationale, if the cycle got that far.
    pub review: Option<&'a str>,
}

/// Why research stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The reviewer decided to finalize.
    Reviewer,
    /// The attempt ceiling forced finalization.
    AttemptCeiling,
}

/// Routing decision after a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Plan another search.
    Retry,
    /// Stop researching.
    Finalize(Termination),
}

/// Mutable accumulator for one research loop.
#[derive(Debug, Clone)]
pub struct SessionState {
    question: String,
    topic: Option<String>,
    current: Vec<SearchResult>,
    vetted: Vec<SearchResult>,
    discarded: Vec<SearchResult>,
    processed_ids: BTreeSet<String>,
    reviews: Vec<String>,
    decisions: Vec<Decision>,
    attempts: usize,
    searches: Vec<SearchAttempt>,
    thought_process: Vec<StepRecord>,
}

impl SessionState {
    /// Creates an empty state for `question`, optionally scoped to a topic.
    pub fn new(question: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            question: question.into(),
            topic,
            current: Vec::new(),
            vetted: Vec::new(),
            discarded: Vec::new(),
            processed_ids: BTreeSet::new(),
            reviews: Vec::new(),
            decisions: Vec::new(),
            attempts: 0,
            searches: Vec::new(),
            thought_process: Vec::new(),
        }
    }

    /// The user's question.
    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    /// The research topic, in fan-out mode.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// The unreviewed batch.
    #[must_use]
    pub fn current(&self) -> &[SearchResult] {
        &self.current
    }

    /// Results confirmed relevant, in the order they were vetted.
    #[must_use]
    pub fn vetted(&self) -> &[SearchResult] {
        &self.vetted
    }

    /// Results judged irrelevant.
    #[must_use]
    pub fn discarded(&self) -> &[SearchResult] {
        &self.discarded
    }

    /// Every id ever classified; excluded from future retrieval.
    #[must_use]
    pub const fn processed_ids(&self) -> &BTreeSet<String> {
        &self.processed_ids
    }

    /// Reviewer rationales, one per cycle.
    #[must_use]
    pub fn reviews(&self) -> &[String] {
        &self.reviews
    }

    /// Reviewer decisions, one per cycle.
    #[must_use]
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Planning cycles started.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    /// Planned searches, one per cycle.
    #[must_use]
    pub fn searches(&self) -> &[SearchAttempt] {
        &self.searches
    }

    /// The provenance log.
    #[must_use]
    pub fn thought_process(&self) -> &[StepRecord] {
        &self.thought_process
    }

    /// Past searches paired with their reviews, oldest first.
    pub fn history(&self) -> impl Iterator<Item = HistoryEntry<'_>> {
        self.searches
            .iter()
            .enumerate()
            .map(|(i, search)| HistoryEntry {
                search,
                review: self.reviews.get(i).map(String::as_str),
            })
    }

    /// Starts a planning cycle. Returns the 1-based attempt number.
    pub const fn begin_attempt(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    /// Records the planner's output for the current attempt.
    pub fn record_search(&mut self, query: impl Into<String>, filter: Option<String>) {
        self.searches.push(SearchAttempt {
            query: query.into(),
            filter,
        });
    }

    /// Installs a freshly retrieved batch as the current batch.
    ///
    /// Results whose id was already processed, or that repeat an id earlier
    /// in the same batch, are dropped: a passage is reviewed at most once.
    /// Returns the number of results dropped.
    pub fn set_batch(&mut self, results: Vec<SearchResult>) -> usize {
        let offered = results.len();
        let mut seen = HashSet::new();
        self.current = results
            .into_iter()
            .filter(|r| !self.processed_ids.contains(&r.id) && seen.insert(r.id.clone()))
            .collect();
        let dropped = offered - self.current.len();
        if dropped > 0 {
            warn!(
                dropped,
                topic = self.topic.as_deref(),
                "index returned already-processed or repeated passages"
            );
        }
        dropped
    }

    /// Applies a review to the current batch.
    ///
    /// Classifies the batch (repairing the verdict if needed), moves each
    /// result to vetted or discarded, marks its id processed, appends the
    /// rationale and decision, and clears the current batch.
    pub fn apply_review(&mut self, verdict: ReviewVerdict) -> AppliedReview {
        let batch = std::mem::take(&mut self.current);
        let Classification {
            valid,
            invalid,
            repairs,
        } = verdict.classify(batch.len());

        let mut slots: Vec<Option<SearchResult>> = batch.into_iter().map(Some).collect();
        let mut valid_summaries = Vec::with_capacity(valid.len());
        for idx in valid {
            if let Some(result) = slots[idx].take() {
                valid_summaries.push(result.summary());
                self.processed_ids.insert(result.id.clone());
                self.vetted.push(result);
            }
        }
        let mut invalid_summaries = Vec::with_capacity(invalid.len());
        for idx in invalid {
            if let Some(result) = slots[idx].take() {
                invalid_summaries.push(result.summary());
                self.processed_ids.insert(result.id.clone());
                self.discarded.push(result);
            }
        }

        self.reviews.push(verdict.rationale.clone());
        self.decisions.push(verdict.decision);

        AppliedReview {
            rationale: verdict.rationale,
            decision: verdict.decision,
            valid: valid_summaries,
            invalid: invalid_summaries,
            repairs: (!repairs.is_clean()).then_some(repairs),
        }
    }

    /// Decides where the loop goes next.
    ///
    /// The ceiling is checked first: once `max_attempts` cycles have run the
    /// loop finalizes whatever the reviewer said. An empty decision history
    /// finalizes.
    #[must_use]
    pub fn route(&self, max_attempts: usize) -> Route {
        if self.attempts >= max_attempts {
            return Route::Finalize(Termination::AttemptCeiling);
        }
        match self.decisions.last() {
            Some(Decision::Retry) => Route::Retry,
            Some(Decision::Finalize) | None => Route::Finalize(Termination::Reviewer),
        }
    }

    /// Appends a provenance step.
    pub fn log(&mut self, record: StepRecord) {
        self.thought_process.push(record);
    }

    /// Consumes the state, returning the vetted results and the provenance log.
    #[must_use]
    pub fn into_parts(self) -> (Vec<SearchResult>, Vec<StepRecord>) {
        (self.vetted, self.thought_process)
    }

    /// Checks the between-cycle invariants, describing the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let n = self.attempts;
        if self.searches.len() != n || self.reviews.len() != n || self.decisions.len() != n {
            return Err(format!(
                "history lengths diverge: attempts={n} searches={} reviews={} decisions={}",
                self.searches.len(),
                self.reviews.len(),
                self.decisions.len()
            ));
        }
        let vetted: HashSet<&str> = self.vetted.iter().map(|r| r.id.as_str()).collect();
        if let Some(both) = self.discarded.iter().find(|r| vetted.contains(r.id.as_str())) {
            return Err(format!("id {} is both vetted and discarded", both.id));
        }
        if let Some(missing) = self
            .vetted
            .iter()
            .chain(&self.discarded)
            .find(|r| !self.processed_ids.contains(&r.id))
        {
            return Err(format!("id {} classified but not processed", missing.id));
        }
        Ok(())
    }
}

/// Outcome of [`SessionState::apply_review`], for the provenance log.
#[derive(Debug, Clone)]
pub struct AppliedReview {
    /// Reviewer's analysis.
    pub rationale: String,
    /// Reviewer's decision.
    pub decision: Decision,
    /// Results moved to vetted.
    pub valid: Vec<SourceSummary>,
    /// Results moved to discarded.
    pub invalid: Vec<SourceSummary>,
    /// Repairs applied, if the verdict was malformed.
    pub repairs: Option<super::verdict::VerdictRepairs>,
}
