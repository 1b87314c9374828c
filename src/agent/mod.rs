//! The agentic research loop and its LLM-backed collaborators.
//!
//! # Architecture
//!
//! ```text
//! question → LoopController
//!   ├── PlannerAgent      (query + filter from search history)
//!   ├── RetrievalGateway  (hybrid search, processed ids excluded)
//!   ├── ReviewerAgent     (valid / invalid / retry | finalize)
//!   └── repeat until finalize or the attempt ceiling
//!        → SynthesizerAgent (streamed answer)
//!
//! question → FanOutCoordinator
//!   ├── DecomposerAgent (2-5 topics)
//!   ├── Fan-out → one LoopController per topic, concurrently
//!   ├── merge by topic label
//!   └── SynthesizerAgent once over all topics
//! ```
//!
//! Every collaborator sits behind a trait ([`Planner`], [`Reviewer`],
//! [`Synthesizer`], [`Decomposer`], [`crate::search::Retriever`]) and is
//! injected at construction, so any of them can be stubbed.

pub mod client;
pub mod config;
pub mod controller;
pub mod decomposer;
pub mod message;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reviewer;
pub mod synthesizer;
pub mod traits;

#[cfg(test)]
mod stubs;

// Re-export key types
pub use client::{Providers, create_providers};
pub use config::AgentConfig;
pub use controller::{Components, LoopController, Research};
pub use decomposer::{Decomposer, DecomposerAgent, TaxonomyExtraction};
pub use message::{ChatMessage, ChatRequest, Completion, ResponseSchema, Role};
pub use orchestrator::FanOutCoordinator;
pub use planner::{Planner, PlannerAgent, QueryMode, SearchPlan};
pub use prompt::{CategoryGuide, PromptSet};
pub use provider::{FragmentStream, LlmProvider};
pub use reviewer::{Reviewer, ReviewerAgent};
pub use synthesizer::{EvidenceGroup, SynthesisRequest, Synthesizer, SynthesizerAgent};
pub use traits::Agent;
