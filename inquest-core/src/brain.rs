//! Model provider abstraction.
//!
//! Defines the `LlmProvider` trait for model-agnostic streamed calls, and a
//! scripted `MockLlmProvider` used throughout the test suites.

use crate::error::LlmError;
use crate::types::{ModelDelta, ModelRequest};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Trait for model providers.
///
/// A call streams its output as ordered `ModelDelta`s on `tx` and returns once
/// the provider has finished. Dropping the receiver is a request to stop early.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform one streamed call.
    async fn stream(
        &self,
        request: ModelRequest,
        tx: mpsc::Sender<ModelDelta>,
    ) -> Result<(), LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// A scripted reply for `MockLlmProvider`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockReply {
    /// Streamed on the out-of-band reasoning channel before the content.
    pub reasoning: Option<String>,
    pub content: String,
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            reasoning: None,
            content: content.into(),
        }
    }

    pub fn with_reasoning(reasoning: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            reasoning: Some(reasoning.into()),
            content: content.into(),
        }
    }
}

type MockHandler = dyn Fn(&ModelRequest) -> Result<MockReply, LlmError> + Send + Sync;

/// A mock provider for testing. Replies are produced by a handler over the
/// request and streamed in fixed-size character chunks.
pub struct MockLlmProvider {
    model: String,
    chunk_chars: usize,
    handler: Box<MockHandler>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::with_response("I'm a mock LLM. No scripted reply available.")
    }

    /// Create a provider that always replies with the given text.
    pub fn with_response(text: &str) -> Self {
        let text = text.to_string();
        Self::with_handler(move |_| Ok(MockReply::text(text.clone())))
    }

    /// Create a provider whose replies are computed from each request.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<MockReply, LlmError> + Send + Sync + 'static,
    {
        Self {
            model: "mock-model".to_string(),
            chunk_chars: 4,
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Stream replies in chunks of `chars` characters (minimum 1).
    pub fn chunked(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn chunks(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_chars)
            .map(|c| c.iter().collect())
            .collect()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn stream(
        &self,
        request: ModelRequest,
        tx: mpsc::Sender<ModelDelta>,
    ) -> Result<(), LlmError> {
        let reply = (self.handler)(&request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let reply = reply?;

        let reasoning = reply.reasoning.as_deref().unwrap_or("");
        for chunk in self.chunks(reasoning) {
            if tx.send(ModelDelta::reasoning(chunk)).await.is_err() {
                return Ok(());
            }
        }
        for chunk in self.chunks(&reply.content) {
            if tx.send(ModelDelta::content(chunk)).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
