//! # agentic-rag
//!
//! Iterative retrieval-augmented question answering.
//!
//! A [`LoopController`] answers one question by cycling through
//! plan, retrieve and review until the reviewer finalizes or the attempt
//! ceiling is reached, then streams an answer grounded only in the vetted
//! passages. A [`FanOutCoordinator`] splits a broad question into 2-5
//! topics, runs one loop per topic concurrently and synthesizes once over
//! the merged evidence.
//!
//! ## Modules
//!
//! - [`core`]: results, verdicts, session state, events and payloads
//! - [`search`]: index backends and the retrieval gateway
//! - [`agent`]: LLM-backed planner, reviewer, synthesizer and decomposer,
//!   plus the loop controller and fan-out coordinator
//! - [`cli`]: the `agentic-rag` command line
//! - [`error`]: error types

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod search;

pub use agent::{
    AgentConfig, Components, FanOutCoordinator, LoopController, QueryMode, create_providers,
};
pub use core::{
    Decision, EventSink, FanOutPayload, ReviewVerdict, SearchResult, SessionEvent, SessionPayload,
};
pub use error::{Error, Result};
pub use search::{MemoryIndex, RetrievalGateway, SearchConfig};
