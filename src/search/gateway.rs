//! The retrieval gateway.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::config::SearchConfig;
use super::{Embedder, Retriever, SearchIndex, SearchRequest, filter};
use crate::core::SearchResult;
use crate::error::{BackendError, RetrievalFailure};

/// Embeds the query, composes the filter and queries the index.
///
/// Without an embedder the vector leg is skipped and the index runs a
/// lexical-only query.
#[derive(Clone)]
pub struct RetrievalGateway {
    index: Arc<dyn SearchIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    config: SearchConfig,
}

impl RetrievalGateway {
    /// Creates a gateway over `index`.
    #[must_use]
    pub fn new(
        index: Arc<dyn SearchIndex>,
        embedder: Option<Arc<dyn Embedder>>,
        config: SearchConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }
}

impl std::fmt::Debug for RetrievalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalGateway")
            .field("index", &self.index.name())
            .field("embedder", &self.embedder.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Retriever for RetrievalGateway {
    async fn retrieve(
        &self,
        query: &str,
        excluded: &BTreeSet<String>,
        planner_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, RetrievalFailure> {
        let composed = filter::compose(excluded, planner_filter);
        let fail = |source: BackendError| RetrievalFailure {
            query: query.to_string(),
            filter: composed.clone(),
            source,
        };

        let vector = match &self.embedder {
            Some(embedder) => Some(embedder.embed(query).await.map_err(fail)?),
            None => None,
        };

        let request = SearchRequest {
            text: query.to_string(),
            vector,
            top_k: self.config.top_k,
            neighbor_count: self.config.neighbor_count,
            filter: composed.clone(),
        };
        let results = self.index.search(&request).await.map_err(fail)?;

        debug!(
            index = self.index.name(),
            excluded = excluded.len(),
            filter = composed.as_deref(),
            result_count = results.len(),
            "retrieved"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingIndex {
        requests: Mutex<Vec<SearchRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn search(
            &self,
            request: &SearchRequest,
        ) -> Result<Vec<SearchResult>, BackendError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            if self.fail {
                return Err(BackendError::Request {
                    message: "503 Service Unavailable".to_string(),
                    status: Some(503),
                });
            }
            Ok(vec![
                SearchResult::new("a", "alpha", "a.pdf").with_score(1.5),
                SearchResult::new("b", "beta", "b.pdf").with_score(0.7),
            ])
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
            Err(BackendError::Embedding {
                message: "quota exceeded".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_request_shape() {
        let index = Arc::new(RecordingIndex::default());
        let gateway = RetrievalGateway::new(
            index.clone(),
            Some(Arc::new(FixedEmbedder)),
            SearchConfig::default(),
        );
        let excluded: BTreeSet<String> = ["x".to_string()].into();
        let results = gateway
            .retrieve("company revenue", &excluded, Some("category eq 'Finance'"))
            .await
            .unwrap_or_default();

        assert_eq!(results.len(), 2);
        assert!((results[0].score - 1.5).abs() < f64::EPSILON);

        let requests = index.requests.lock().map(|r| r.clone()).unwrap_or_default();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.text, "company revenue");
        assert_eq!(req.top_k, 5);
        assert_eq!(req.neighbor_count, 30);
        assert_eq!(req.vector.as_deref(), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(
            req.filter.as_deref(),
            Some("not search.in(id, 'x', ',') and (category eq 'Finance')")
        );
    }

    #[tokio::test]
    async fn test_no_filter_when_nothing_excluded() {
        let index = Arc::new(RecordingIndex::default());
        let gateway = RetrievalGateway::new(index.clone(), None, SearchConfig::default());
        let _ = gateway.retrieve("q", &BTreeSet::new(), None).await;
        let requests = index.requests.lock().map(|r| r.clone()).unwrap_or_default();
        assert!(requests[0].filter.is_none());
        assert!(requests[0].vector.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_carries_query_and_filter() {
        let index = Arc::new(RecordingIndex {
            fail: true,
            ..RecordingIndex::default()
        });
        let gateway = RetrievalGateway::new(index, None, SearchConfig::default());
        let err = gateway
            .retrieve("q", &BTreeSet::new(), Some("category eq 'A'"))
            .await
            .err();
        let err = err.unwrap_or_else(|| unreachable!());
        assert_eq!(err.query, "q");
        assert_eq!(err.filter.as_deref(), Some("(category eq 'A')"));
        assert!(matches!(err.source, BackendError::Request { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retrieval_failure() {
        let index = Arc::new(RecordingIndex::default());
        let gateway = RetrievalGateway::new(
            index.clone(),
            Some(Arc::new(BrokenEmbedder)),
            SearchConfig::default(),
        );
        let err = gateway.retrieve("q", &BTreeSet::new(), None).await.err();
        assert!(matches!(
            err.map(|e| e.source),
            Some(BackendError::Embedding { .. })
        ));
        let requests = index.requests.lock().map(|r| r.len()).unwrap_or_default();
        assert_eq!(requests, 0);
    }
}
