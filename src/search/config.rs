//! Retrieval tuning.

/// Default maximum results per retrieval.
pub const DEFAULT_TOP_K: usize = 5;
/// Default candidates considered by the vector leg.
pub const DEFAULT_NEIGHBOR_COUNT: usize = 30;

/// Result cap and vector-leg breadth for the retrieval gateway.
///
/// The two are independent: the index may rank a wide candidate set
/// (`neighbor_count`) before returning the best `top_k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Maximum results per retrieval.
    pub top_k: usize,
    /// Candidates considered by the vector leg.
    pub neighbor_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            neighbor_count: DEFAULT_NEIGHBOR_COUNT,
        }
    }
}

impl SearchConfig {
    /// Sets the result cap.
    #[must_use]
    pub const fn top_k(mut self, n: usize) -> Self {
        self.top_k = n;
        self
    }

    /// Sets the vector-leg candidate count.
    #[must_use]
    pub const fn neighbor_count(mut self, n: usize) -> Self {
        self.neighbor_count = n;
        self
    }
}
