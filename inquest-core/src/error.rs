//! Error types for the Inquest core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering model calls, search, configuration, request validation, and
//! research orchestration.

/// Top-level error type for the Inquest core library.
#[derive(Debug, thiserror::Error)]
pub enum InquestError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("API key missing: set {var}")]
    MissingApiKey { var: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from a search backend. Never escapes the search adapter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {message}")]
    Request { message: String },

    #[error("Search provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("Failed to parse search response: {message}")]
    Parse { message: String },

    #[error("Search API key missing: set {var}")]
    MissingKey { var: String },

    #[error("Search timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Request validation failures. Reported before any streaming begins.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("a non-empty messages array or topic is required")]
    MissingMessages,

    #[error("no user message found in the conversation")]
    NoUserMessage,

    #[error("the research topic is empty")]
    EmptyTopic,

    #[error("breadth must be between 1 and {max}, got {value}")]
    InvalidBreadth { value: i64, max: usize },

    #[error("depth must be between 1 and {max}, got {value}")]
    InvalidDepth { value: i64, max: usize },
}

/// Fatal errors for one research run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResearchError {
    #[error("research run was cancelled")]
    Cancelled,

    #[error("report generation failed: {0}")]
    Report(LlmError),

    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),
}

/// A type alias for results using the top-level `InquestError`.
pub type Result<T> = std::result::Result<T, InquestError>;
