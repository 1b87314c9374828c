//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::QueryMode;
use crate::search::config::{DEFAULT_NEIGHBOR_COUNT, DEFAULT_TOP_K};

/// agentic-rag: iterative retrieval-augmented question answering.
///
/// Plans a search, retrieves passages, has a reviewer vet them, and
/// retries until the evidence is sufficient or the attempt ceiling is
/// reached, then streams an answer grounded in the vetted passages.
#[derive(Parser, Debug)]
#[command(name = "agentic-rag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question with a single research loop.
    #[command(after_help = r#"Examples:
  agentic-rag ask "What is the company's revenue?" --corpus docs.json
  agentic-rag ask "What awards has the firm won?" --mode hypothetical
  agentic-rag --format json ask "Who are the partners?" | jq '.citations[].id'
"#)]
    Ask(SessionArgs),

    /// Answer a broad question by researching 2-5 topics concurrently.
    #[command(after_help = r#"Examples:
  agentic-rag research "Compare AWS Lambda and Azure Functions" --corpus docs.json
  agentic-rag research "Best practices for microservices" --max-concurrency 2
"#)]
    Research {
        /// Session options.
        #[command(flatten)]
        session: SessionArgs,

        /// Maximum topic loops running at once.
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// Write the default prompt templates to a directory for editing.
    ///
    /// Existing files are left untouched.
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/agentic-rag/prompts/`.
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// Options shared by `ask` and `research`.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// The question to answer.
    pub question: String,

    /// Query style for the planner.
    #[arg(long, value_enum)]
    pub mode: Option<QueryMode>,

    /// Planning cycles before finalization is forced.
    #[arg(long)]
    pub max_attempts: Option<usize>,

    /// JSON document file searched in memory instead of Azure AI Search.
    #[arg(long, env = "RAG_CORPUS")]
    pub corpus: Option<PathBuf>,

    /// Directory containing prompt template files.
    #[arg(long)]
    pub prompt_dir: Option<PathBuf>,

    /// JSON file describing document categories for the planner.
    #[arg(long)]
    pub category_guide: Option<PathBuf>,

    /// Maximum results per retrieval.
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Candidates considered by the vector leg.
    #[arg(long, default_value_t = DEFAULT_NEIGHBOR_COUNT)]
    pub neighbor_count: usize,

    /// Model for the planner (and decomposer).
    #[arg(long)]
    pub planner_model: Option<String>,

    /// Model for the reviewer.
    #[arg(long)]
    pub reviewer_model: Option<String>,

    /// Model for the synthesizer.
    #[arg(long)]
    pub synthesizer_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "agentic-rag",
            "--format",
            "json",
            "ask",
            "What is the revenue?",
            "--mode",
            "hypothetical",
            "-k",
            "8",
        ])
        .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(cli.format, "json");
        let Commands::Ask(args) = cli.command else {
            unreachable!()
        };
        assert_eq!(args.question, "What is the revenue?");
        assert_eq!(args.mode, Some(QueryMode::Hypothetical));
        assert_eq!(args.top_k, 8);
        assert_eq!(args.neighbor_count, DEFAULT_NEIGHBOR_COUNT);
    }

    #[test]
    fn test_parse_research() {
        let cli = Cli::try_parse_from([
            "agentic-rag",
            "research",
            "Compare A and B",
            "--max-concurrency",
            "2",
            "--max-attempts",
            "4",
        ])
        .unwrap_or_else(|e| unreachable!("{e}"));
        let Commands::Research {
            session,
            max_concurrency,
        } = cli.command
        else {
            unreachable!()
        };
        assert_eq!(max_concurrency, Some(2));
        assert_eq!(session.max_attempts, Some(4));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let parsed = Cli::try_parse_from(["agentic-rag", "ask", "q", "--mode", "fuzzy"]);
        assert!(parsed.is_err());
    }
}
