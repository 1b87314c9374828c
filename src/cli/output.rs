//! Output formatting for CLI commands.

use std::fmt::Write;

use serde::Serialize;

use crate::core::SearchResult;
use crate::error::CommandError;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text; answers stream to stdout as they arrive.
    #[default]
    Text,
    /// One pretty-printed JSON document once the session completes.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognized is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::OutputFormat`] if serialization fails.
    pub fn to_json<T: Serialize>(self, value: &T) -> Result<String, CommandError> {
        serde_json::to_string_pretty(value)
            .map_err(|e| CommandError::OutputFormat(format!("JSON serialization failed: {e}")))
    }
}

/// Renders the summary printed after a streamed answer.
#[must_use]
pub fn format_summary(attempts: usize, incomplete: bool, citations: &[SearchResult]) -> String {
    let mut out = format!(
        "\n\n---\nAttempts: {attempts} | Sources: {} | Complete: {}\n",
        citations.len(),
        if incomplete { "no" } else { "yes" }
    );
    for (i, c) in citations.iter().enumerate() {
        let _ = write!(out, "[{}] {}", i + 1, c.source_file);
        if let Some(page) = c.source_pages {
            let _ = write!(out, " p.{page}");
        }
        let _ = writeln!(out, " ({})", c.id);
    }
    out
}
