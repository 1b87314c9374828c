//! Scripted collaborators for loop and fan-out tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::stream;

use super::decomposer::{Decomposer, TaxonomyExtraction};
use super::message::{ChatRequest, Completion};
use super::planner::{Planner, SearchPlan};
use super::provider::LlmProvider;
use super::reviewer::Reviewer;
use super::synthesizer::{SynthesisRequest, Synthesizer};
use super::traits::FragmentStream;
use crate::core::{Decision, HistoryEntry, ReviewVerdict, SearchResult};
use crate::error::{AgentError, BackendError, RetrievalFailure};
use crate::search::Retriever;

pub fn result(id: &str) -> SearchResult {
    SearchResult::new(id, format!("content of {id}"), "doc.pdf")
}

/// Replies with each scripted message in turn, repeating the last.
/// A stream yields every scripted message as one fragment.
pub struct ScriptedProvider {
    replies: Vec<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies.iter().map(|r| (*r).to_string()).collect(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, request: &ChatRequest) -> usize {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }
        self.calls.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion, AgentError> {
        let n = self.record(request);
        let content = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        Ok(Completion {
            content,
            truncated: false,
        })
    }

    async fn stream(&self, request: &ChatRequest) -> Result<FragmentStream, AgentError> {
        self.record(request);
        let fragments: Vec<_> = self.replies.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}

fn api_failure(message: &str) -> AgentError {
    AgentError::ApiRequest {
        message: message.to_string(),
        status: Some(500),
    }
}

/// Plans `"<topic> query <n>"`; fails for `fail_topic`.
#[derive(Default)]
pub struct StubPlanner {
    pub calls: AtomicUsize,
    pub fail_topic: Option<String>,
    pub fail_always: bool,
    pub history_lens: Mutex<Vec<usize>>,
}

impl StubPlanner {
    pub fn failing_for(topic: &str) -> Self {
        Self {
            fail_topic: Some(topic.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Planner for StubPlanner {
    async fn plan(
        &self,
        _question: &str,
        topic: Option<&str>,
        history: &[HistoryEntry<'_>],
    ) -> Result<SearchPlan, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut lens) = self.history_lens.lock() {
            lens.push(history.len());
        }
        if self.fail_always || (topic.is_some() && topic == self.fail_topic.as_deref()) {
            return Err(api_failure("planner unavailable"));
        }
        Ok(SearchPlan {
            search_query: format!("{} query {n}", topic.unwrap_or("main")),
            filter: None,
        })
    }
}

/// One scripted retrieval outcome.
pub enum Batch {
    Ids(Vec<&'static str>),
    Fail,
}

/// Returns scripted batches in call order (the last repeats) and records
/// every exclusion set it was given.
pub struct StubRetriever {
    script: Vec<Batch>,
    pub calls: AtomicUsize,
    pub excluded: Mutex<Vec<BTreeSet<String>>>,
}

impl StubRetriever {
    pub fn new(script: Vec<Batch>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            excluded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Retriever for StubRetriever {
    async fn retrieve(
        &self,
        query: &str,
        excluded: &BTreeSet<String>,
        filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, RetrievalFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.excluded.lock() {
            seen.push(excluded.clone());
        }
        match &self.script[n.min(self.script.len() - 1)] {
            Batch::Ids(ids) => Ok(ids.iter().map(|id| result(id)).collect()),
            Batch::Fail => Err(RetrievalFailure {
                query: query.to_string(),
                filter: filter.map(str::to_string),
                source: BackendError::Request {
                    message: "503 Service Unavailable".to_string(),
                    status: Some(503),
                },
            }),
        }
    }
}

/// Derives two result ids from the query's topic prefix, honoring the
/// exclusion set like a real index.
#[derive(Default)]
pub struct EchoRetriever;

#[async_trait]
impl Retriever for EchoRetriever {
    async fn retrieve(
        &self,
        query: &str,
        excluded: &BTreeSet<String>,
        _filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, RetrievalFailure> {
        let prefix = query.split(" query ").next().unwrap_or(query);
        Ok((1..=4)
            .map(|i| format!("{prefix}-{i}"))
            .filter(|id| !excluded.contains(id))
            .take(2)
            .map(|id| result(&id))
            .collect())
    }
}

type VerdictFn = dyn Fn(usize, usize) -> ReviewVerdict + Send + Sync;

/// Builds each verdict from `(call index, batch length)`.
pub struct StubReviewer {
    decide: Box<VerdictFn>,
    pub calls: AtomicUsize,
    pub batch_lens: Mutex<Vec<usize>>,
    pub history_lens: Mutex<Vec<usize>>,
}

impl StubReviewer {
    pub fn new(decide: impl Fn(usize, usize) -> ReviewVerdict + Send + Sync + 'static) -> Self {
        Self {
            decide: Box::new(decide),
            calls: AtomicUsize::new(0),
            batch_lens: Mutex::new(Vec::new()),
            history_lens: Mutex::new(Vec::new()),
        }
    }

    /// Marks every result valid and always gives `decision`.
    pub fn all_valid(decision: Decision) -> Self {
        Self::new(move |_, len| {
            let valid = (0..len).filter_map(|i| i64::try_from(i).ok()).collect();
            ReviewVerdict::new("all relevant", valid, Vec::new(), decision)
        })
    }
}

#[async_trait]
impl Reviewer for StubReviewer {
    async fn review(
        &self,
        _question: &str,
        _topic: Option<&str>,
        batch: &[SearchResult],
        _vetted: &[SearchResult],
        history: &[HistoryEntry<'_>],
    ) -> Result<ReviewVerdict, AgentError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut lens) = self.batch_lens.lock() {
            lens.push(batch.len());
        }
        if let Ok(mut lens) = self.history_lens.lock() {
            lens.push(history.len());
        }
        Ok((self.decide)(n, batch.len()))
    }
}

/// Records each request and streams a fixed answer.
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub requests: Mutex<Vec<SynthesisRequest>>,
}

impl RecordingSynthesizer {
    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<FragmentStream, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(Box::pin(stream::iter(vec![
            Ok("Answer ".to_string()),
            Ok("text.".to_string()),
        ])))
    }
}

/// Returns fixed topics, or fails.
pub struct StubDecomposer {
    pub topics: Option<Vec<&'static str>>,
}

#[async_trait]
impl Decomposer for StubDecomposer {
    async fn decompose(&self, _question: &str) -> Result<TaxonomyExtraction, AgentError> {
        let topics = self
            .topics
            .as_ref()
            .ok_or_else(|| api_failure("decomposer unavailable"))?;
        TaxonomyExtraction {
            taxonomies: topics.iter().map(|t| (*t).to_string()).collect(),
            reasoning: "distinct aspects".to_string(),
        }
        .normalized()
    }
}
