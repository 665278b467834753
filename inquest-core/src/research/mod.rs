//! Deep research: recursive web research with streamed reasoning.
//!
//! A run plans search queries for a topic, searches each one, extracts
//! learnings and follow-up questions from the hits, recurses on the
//! follow-ups under a shrinking breadth budget, and finally streams a report.
//! Every model call goes through the [`demux::TokenDemux`] and, where a
//! structured reply is expected, the [`extract::StructuredExtractor`].

pub mod call;
pub mod demux;
pub mod engine;
pub mod extract;
pub mod planner;
pub mod prompts;
pub mod report;
pub mod session;
pub mod state;
pub mod synthesizer;

pub use call::{Delivery, Emitter, Markers, ModelCaller};
pub use demux::{Channel, TokenDemux};
pub use engine::{CallStats, ResearchEngine, RunSummary};
pub use extract::{StructuredExtractor, strip_code_fence};
pub use session::{RunRecord, RunStatus, RunSummaryLine};
pub use state::{ResearchOutcome, ResearchState};
pub use synthesizer::Synthesis;
