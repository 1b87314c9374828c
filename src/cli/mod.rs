//! CLI layer for agentic-rag.
//!
//! Provides the command-line interface using clap: single-loop `ask`,
//! multi-topic `research` and `init-prompts`.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, SessionArgs};
