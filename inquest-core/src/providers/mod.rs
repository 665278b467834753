//! Model provider implementations.
//!
//! Every hosted backend Inquest talks to speaks the OpenAI chat-completions
//! streaming protocol (OpenRouter, OpenAI, Ollama, vLLM, LM Studio), so a
//! single implementation covers them. Use `create_provider()` to build one
//! from config.

pub mod openai_compat;

use crate::brain::{LlmProvider, MockLlmProvider};
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use openai_compat::{OpenAiCompatibleProvider, SseLineBuffer};

/// Create a model provider based on the configuration.
///
/// - `"mock"` → `MockLlmProvider` (offline, canned reply)
/// - everything else → `OpenAiCompatibleProvider`
///
/// Returns an error if the API key cannot be resolved.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockLlmProvider::new())),
        _ => Ok(Arc::new(OpenAiCompatibleProvider::new(config)?)),
    }
}

/// Create a provider with an explicitly supplied API key.
pub fn create_provider_with_key(
    config: &LlmConfig,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockLlmProvider::new())),
        _ => Ok(Arc::new(OpenAiCompatibleProvider::new_with_key(
            config, api_key,
        )?)),
    }
}
