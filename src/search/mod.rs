//! Retrieval: the collaborator seams around the document index.
//!
//! - [`SearchIndex`]: combined lexical + vector query against an index.
//! - [`Embedder`]: text to vector.
//! - [`Retriever`]: what the loop controller calls; implemented by
//!   [`RetrievalGateway`], which embeds the query, composes the exclusion
//!   filter and maps backend errors to [`RetrievalFailure`].

#[cfg(feature = "azure-search")]
pub mod azure;
pub mod config;
pub mod filter;
pub mod gateway;
pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::core::SearchResult;
use crate::error::{BackendError, RetrievalFailure};

#[cfg(feature = "azure-search")]
pub use azure::{AzureSearchConfig, AzureSearchIndex};
pub use config::SearchConfig;
pub use gateway::RetrievalGateway;
pub use memory::{Document, MemoryIndex};

/// One query against a [`SearchIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Text for the lexical leg.
    pub text: String,
    /// Query embedding for the vector leg, when available.
    pub vector: Option<Vec<f32>>,
    /// Maximum results returned.
    pub top_k: usize,
    /// Candidates the vector leg considers before final ranking.
    pub neighbor_count: usize,
    /// Opaque boolean filter predicate.
    pub filter: Option<String>,
}

/// A document index supporting hybrid search.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Runs a hybrid query. Results are ranked best first; scores are
    /// passed through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport, response or filter failures.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, BackendError>;
}

/// Text embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds `text` as a fixed-length vector.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Embedding`] on provider failure.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}

/// The retrieval step of the research loop.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Searches for `query`, never returning an id in `excluded`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalFailure`] carrying the query and composed filter.
    async fn retrieve(
        &self,
        query: &str,
        excluded: &BTreeSet<String>,
        filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, RetrievalFailure>;
}
