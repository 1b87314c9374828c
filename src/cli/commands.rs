//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

#![allow(clippy::format_push_string)]

use std::fmt::Write as FmtWrite;
use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::agent::client::{Providers, create_providers};
use crate::agent::config::AgentConfig;
use crate::agent::controller::{Components, LoopController};
use crate::agent::decomposer::DecomposerAgent;
use crate::agent::orchestrator::FanOutCoordinator;
use crate::agent::planner::PlannerAgent;
use crate::agent::prompt::{CategoryGuide, PromptSet};
use crate::agent::reviewer::ReviewerAgent;
use crate::agent::synthesizer::SynthesizerAgent;
use crate::cli::output::{OutputFormat, format_summary};
use crate::cli::parser::{Cli, Commands, SessionArgs};
use crate::core::{EventSink, EventStream, SessionEvent};
use crate::error::{CommandError, Result};
use crate::search::{MemoryIndex, RetrievalGateway, SearchConfig, SearchIndex};

/// Executes the CLI command.
///
/// In text mode the answer of `ask`/`research` streams to stdout while it
/// is generated and the returned string is the trailing summary.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ask(args) => cmd_ask(args, format),
        Commands::Research {
            session,
            max_concurrency,
        } => cmd_research(session, *max_concurrency, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Builds agent configuration from env + CLI overrides.
fn build_config(args: &SessionArgs, max_concurrency: Option<usize>) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder().from_env();
    if let Some(mode) = args.mode {
        builder = builder.query_mode(mode);
    }
    if let Some(n) = args.max_attempts {
        builder = builder.max_attempts(n);
    }
    if let Some(n) = max_concurrency {
        builder = builder.max_concurrency(n);
    }
    if let Some(model) = &args.planner_model {
        builder = builder.planner_model(model);
    }
    if let Some(model) = &args.reviewer_model {
        builder = builder.reviewer_model(model);
    }
    if let Some(model) = &args.synthesizer_model {
        builder = builder.synthesizer_model(model);
    }
    if let Some(dir) = &args.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if let Some(path) = &args.category_guide {
        builder = builder.category_guide(path);
    }

    builder
        .build()
        .map_err(|e| CommandError::ExecutionFailed(format!("Agent configuration error: {e}")).into())
}

/// Everything a session command needs.
struct Session {
    config: AgentConfig,
    providers: Providers,
    prompts: PromptSet,
    controller: LoopController,
}

fn build_session(args: &SessionArgs, max_concurrency: Option<usize>) -> Result<Session> {
    let config = build_config(args, max_concurrency)?;
    let providers = create_providers(&config).map_err(|e| {
        CommandError::ExecutionFailed(format!("Provider creation failed: {e}"))
    })?;
    let prompts = PromptSet::load(config.prompt_dir.as_deref());
    let guide = match &config.category_guide {
        Some(path) => CategoryGuide::from_file(path)?,
        None => CategoryGuide::default(),
    };

    let search = SearchConfig::default()
        .top_k(args.top_k)
        .neighbor_count(args.neighbor_count);
    let (index, embed): (Arc<dyn SearchIndex>, bool) = match &args.corpus {
        Some(path) => {
            let index = MemoryIndex::from_json_file(path)?;
            info!(documents = index.len(), path = %path.display(), "loaded corpus");
            let embed = index.has_vectors();
            (Arc::new(index), embed)
        }
        None => (remote_index()?, true),
    };
    let retriever = RetrievalGateway::new(
        index,
        embed.then(|| providers.embedder.clone()),
        search,
    );

    let llm = &providers.llm;
    let components = Components {
        planner: Arc::new(PlannerAgent::new(llm.clone(), &config, &prompts, &guide)),
        retriever: Arc::new(retriever),
        reviewer: Arc::new(ReviewerAgent::new(llm.clone(), &config, &prompts)),
        synthesizer: Arc::new(SynthesizerAgent::new(llm.clone(), &config, &prompts)),
    };
    let controller = LoopController::new(components, config.max_attempts);

    Ok(Session {
        config,
        providers,
        prompts,
        controller,
    })
}

#[cfg(feature = "azure-search")]
fn remote_index() -> Result<Arc<dyn SearchIndex>> {
    use crate::search::{AzureSearchConfig, AzureSearchIndex};

    let config = AzureSearchConfig::from_env()?;
    Ok(Arc::new(AzureSearchIndex::new(config)?))
}

#[cfg(not(feature = "azure-search"))]
fn remote_index() -> Result<Arc<dyn SearchIndex>> {
    Err(CommandError::InvalidArgument(
        "--corpus is required when built without the azure-search feature".to_string(),
    )
    .into())
}

/// Create tokio runtime as sync/async bridge.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

/// Writes answer fragments to stdout as they arrive (text mode only) and
/// logs progress messages.
async fn forward_events(mut events: EventStream, format: OutputFormat) {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            SessionEvent::AnswerFragment { text } if format == OutputFormat::Text => {
                let _ = stdout.write_all(text.as_bytes()).await;
                let _ = stdout.flush().await;
            }
            SessionEvent::Status { topic, message } => {
                info!(topic = topic.as_deref(), "{message}");
            }
            _ => {}
        }
    }
}

fn cmd_ask(args: &SessionArgs, format: OutputFormat) -> Result<String> {
    let session = build_session(args, None)?;
    info!(
        mode = ?session.config.query_mode,
        max_attempts = session.config.max_attempts,
        "starting session"
    );

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let (sink, events) = EventSink::channel();
        let printer = tokio::spawn(forward_events(events, format));
        let outcome = session.controller.run(&args.question, &sink).await;
        drop(sink);
        let _ = printer.await;
        outcome
    });

    let payload = outcome
        .map_err(|e| CommandError::ExecutionFailed(format!("Session failed: {e}")))?;
    match format {
        OutputFormat::Text => Ok(format_summary(
            payload.attempts,
            payload.incomplete,
            &payload.citations,
        )),
        OutputFormat::Json => Ok(format.to_json(&payload)?),
    }
}

fn cmd_research(
    args: &SessionArgs,
    max_concurrency: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let session = build_session(args, max_concurrency)?;
    let decomposer = DecomposerAgent::new(
        session.providers.llm.clone(),
        &session.config,
        &session.prompts,
    );
    let coordinator = FanOutCoordinator::new(
        Arc::new(decomposer),
        session.controller,
        session.config.max_concurrency,
    );
    info!(
        max_concurrency = session.config.max_concurrency,
        max_attempts = session.config.max_attempts,
        "starting fan-out session"
    );

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let (sink, events) = EventSink::channel();
        let printer = tokio::spawn(forward_events(events, format));
        let outcome = coordinator.run(&args.question, &sink).await;
        drop(sink);
        let _ = printer.await;
        outcome
    });

    let payload = outcome
        .map_err(|e| CommandError::ExecutionFailed(format!("Session failed: {e}")))?;
    match format {
        OutputFormat::Text => {
            let mut output = format_summary(payload.attempts, payload.incomplete, &payload.citations);
            output.push_str("Topics:\n");
            for topic in &payload.research {
                let _ = write!(
                    output,
                    "  {}: {} source(s), {} attempt(s)",
                    topic.topic,
                    topic.vetted_results.len(),
                    topic.attempts
                );
                if let Some(failure) = &topic.failure {
                    let _ = write!(output, " [failed: {failure}]");
                }
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&payload)?),
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str(&format!(
                    "  {}\n",
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                ));
            }
            output.push_str("\nEdit these files to customize agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json)?)
        }
    }
}
