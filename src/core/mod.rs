//! Domain types shared by the retrieval loop.

pub mod event;
pub mod payload;
pub mod result;
pub mod state;
pub mod verdict;

pub use event::{EventSink, EventStream, SessionEvent, StepRecord, TopicTally};
pub use payload::{FanOutPayload, SessionPayload, TopicResearch};
pub use result::{SearchResult, SourceSummary};
pub use state::{AppliedReview, HistoryEntry, Route, SearchAttempt, SessionState, Termination};
pub use verdict::{Classification, Decision, ReviewVerdict, VerdictRepairs};
