//! Azure AI Search backend over the REST API.
//!
//! Issues one `docs/search` POST per retrieval: the query text drives the
//! lexical leg and, when an embedding is supplied, a `vectorQueries` entry
//! drives the vector leg over `neighbor_count` candidates.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{SearchIndex, SearchRequest};
use crate::core::SearchResult;
use crate::error::BackendError;

/// Default REST API version.
const DEFAULT_API_VERSION: &str = "2023-11-01";
/// Default vector field name.
const DEFAULT_VECTOR_FIELD: &str = "content_vector";
/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Fields returned for each hit.
const SELECT_FIELDS: &str = "id,content,source_file,source_pages";

/// Connection settings for an Azure AI Search index.
#[derive(Debug, Clone)]
pub struct AzureSearchConfig {
    /// Service endpoint, e.g. `https://my-service.search.windows.net`.
    pub endpoint: String,
    /// Admin or query key.
    pub api_key: String,
    /// Index name.
    pub index: String,
    /// REST API version.
    pub api_version: String,
    /// Name of the vector field searched by the vector leg.
    pub vector_field: String,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl AzureSearchConfig {
    /// Creates a configuration with default API version and vector field.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            index: index.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            vector_field: DEFAULT_VECTOR_FIELD.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Reads `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_KEY`, `AZURE_SEARCH_INDEX`
    /// and the optional `AZURE_SEARCH_API_VERSION` / `AZURE_SEARCH_VECTOR_FIELD`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] naming the first missing variable.
    pub fn from_env() -> Result<Self, BackendError> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| BackendError::Config {
                message: format!("{key} is not set"),
            })
        };
        let mut config = Self::new(
            required("AZURE_SEARCH_ENDPOINT")?,
            required("AZURE_SEARCH_KEY")?,
            required("AZURE_SEARCH_INDEX")?,
        );
        if let Ok(version) = std::env::var("AZURE_SEARCH_API_VERSION") {
            config.api_version = version;
        }
        if let Ok(field) = std::env::var("AZURE_SEARCH_VECTOR_FIELD") {
            config.vector_field = field;
        }
        Ok(config)
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.index,
            self.api_version
        )
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "@search.score", default)]
    score: f64,
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    source_file: String,
    #[serde(default)]
    source_pages: Option<Value>,
}

impl Hit {
    fn into_result(self) -> SearchResult {
        let pages = match self.source_pages {
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let mut result =
            SearchResult::new(self.id, self.content, self.source_file).with_score(self.score);
        result.source_pages = pages;
        result
    }
}

/// [`SearchIndex`] backed by Azure AI Search.
#[derive(Debug, Clone)]
pub struct AzureSearchIndex {
    client: Client,
    config: AzureSearchConfig,
}

impl AzureSearchIndex {
    /// Creates a backend for the configured index.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Config`] if the HTTP client cannot be built.
    pub fn new(config: AzureSearchConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Config {
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    fn body(&self, request: &SearchRequest) -> Value {
        let mut body = json!({
            "search": request.text,
            "top": request.top_k,
            "select": SELECT_FIELDS,
        });
        if let Some(ref filter) = request.filter {
            body["filter"] = json!(filter);
        }
        if let Some(ref vector) = request.vector {
            body["vectorQueries"] = json!([{
                "kind": "vector",
                "vector": vector,
                "k": request.neighbor_count,
                "fields": self.config.vector_field,
            }]);
        }
        body
    }
}

#[async_trait]
impl SearchIndex for AzureSearchIndex {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, BackendError> {
        let response = self
            .client
            .post(self.config.search_url())
            .header("api-key", &self.config.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| BackendError::Request {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Request {
                message: format!("HTTP {status}: {text}"),
                status: Some(status.as_u16()),
            });
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|e| BackendError::Response {
                message: e.to_string(),
            })?;
        Ok(parsed.value.into_iter().map(Hit::into_result).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> AzureSearchIndex {
        AzureSearchIndex::new(AzureSearchConfig::new(
            "https://svc.search.windows.net/",
            "key",
            "docs",
        ))
        .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn test_search_url() {
        assert_eq!(
            index().config.search_url(),
            "https://svc.search.windows.net/indexes/docs/docs/search?api-version=2023-11-01"
        );
    }

    #[test]
    fn test_body_hybrid() {
        let body = index().body(&SearchRequest {
            text: "company revenue".to_string(),
            vector: Some(vec![0.5, 0.25]),
            top_k: 5,
            neighbor_count: 30,
            filter: Some("not search.in(id, 'a', ',')".to_string()),
        });
        assert_eq!(body["search"], "company revenue");
        assert_eq!(body["top"], 5);
        assert_eq!(body["filter"], "not search.in(id, 'a', ',')");
        assert_eq!(body["vectorQueries"][0]["k"], 30);
        assert_eq!(body["vectorQueries"][0]["fields"], "content_vector");
        assert_eq!(body["vectorQueries"][0]["kind"], "vector");
    }

    #[test]
    fn test_body_lexical_only() {
        let body = index().body(&SearchRequest {
            text: "q".to_string(),
            vector: None,
            top_k: 5,
            neighbor_count: 30,
            filter: None,
        });
        assert!(body.get("filter").is_none());
        assert!(body.get("vectorQueries").is_none());
    }

    #[test]
    fn test_hit_mapping() {
        let json = r#"{"value": [
            {"@search.score": 3.2, "id": "a", "content": "c", "source_file": "f.pdf", "source_pages": 7},
            {"@search.score": 1.1, "id": "b", "content": "d", "source_file": "g.pdf", "source_pages": "12"},
            {"id": "c"}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        let results: Vec<SearchResult> = parsed.value.into_iter().map(Hit::into_result).collect();
        assert_eq!(results[0].source_pages, Some(7));
        assert!((results[0].score - 3.2).abs() < f64::EPSILON);
        assert_eq!(results[1].source_pages, Some(12));
        assert_eq!(results[2].source_pages, None);
    }
}
