//! Retrieved passages.

use serde::{Deserialize, Serialize};

/// A passage returned by the document index.
///
/// Immutable once retrieved. The `score` is whatever the index assigned;
/// it is carried along for display and never used for control decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Unique key of the passage in the index.
    pub id: String,
    /// Passage text.
    pub content: String,
    /// Source file or table the passage came from.
    pub source_file: String,
    /// Page or chunk index within the source, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pages: Option<u32>,
    /// Index-assigned relevance score (informational only).
    #[serde(default)]
    pub score: f64,
}

impl SearchResult {
    /// Creates a result with no page locator and a zero score.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source_file: source_file.into(),
            source_pages: None,
            score: 0.0,
        }
    }

    /// Sets the page locator.
    #[must_use]
    pub const fn with_pages(mut self, pages: u32) -> Self {
        self.source_pages = Some(pages);
        self
    }

    /// Sets the index score.
    #[must_use]
    pub const fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Returns the provenance summary of this result.
    #[must_use]
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            id: self.id.clone(),
            source_file: self.source_file.clone(),
            source_pages: self.source_pages,
        }
    }
}

/// Where a passage came from, without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    /// Passage identifier.
    pub id: String,
    /// Source file or table.
    pub source_file: String,
    /// Page or chunk index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pages: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_drops_content() {
        let result = SearchResult::new("doc-1", "revenue was $10M", "annual.pdf")
            .with_pages(4)
            .with_score(2.5);
        let summary = result.summary();
        assert_eq!(summary.id, "doc-1");
        assert_eq!(summary.source_file, "annual.pdf");
        assert_eq!(summary.source_pages, Some(4));
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let json = r#"{"id": "a", "content": "text", "source_file": "f.md"}"#;
        let result: SearchResult = serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(result.source_pages, None);
        assert!(result.score.abs() < f64::EPSILON);
    }
}
