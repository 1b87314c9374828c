//! agentic-rag command-line entry point.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentic_rag::cli::{Cli, execute};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "agentic_rag=debug"
    } else {
        "agentic_rag=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let output = execute(&cli)?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(output.as_bytes())
        .context("failed to write output")?;
    if !output.ends_with('\n') {
        writeln!(stdout).context("failed to write output")?;
    }
    Ok(())
}
