//! # Inquest Core
//!
//! Core library for Inquest, a streaming deep-research engine.
//! Provides the model provider interface (brain), search adapter, the
//! recursive research engine, the output multiplexer, the HTTP gateway,
//! configuration, and fundamental types.

pub mod brain;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mux;
pub mod providers;
pub mod research;
pub mod search;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider, MockReply};
pub use config::{InquestConfig, LlmConfig, ResearchConfig, SearchConfig, ServerConfig};
pub use error::{
    ConfigError, InquestError, LlmError, RequestError, ResearchError, Result, SearchError,
};
pub use mux::{EventSink, OutputMultiplexer, WireFormat};
pub use research::{ResearchEngine, ResearchOutcome, ResearchState, RunRecord, RunSummary};
pub use search::{MockSearchProvider, NoSearch, SearchAdapter, SearchOutcome, SearchProvider};
pub use types::{
    ChatMessage, DeltaKind, ModelDelta, ModelRequest, PlannedQuery, ResearchRequest, Role,
    RunEvent, SearchHit, Stage, StreamEvent,
};
