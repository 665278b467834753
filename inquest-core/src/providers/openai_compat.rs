//! OpenAI-compatible streaming provider.
//!
//! Supports OpenRouter, OpenAI, Ollama, vLLM, LM Studio, and any endpoint that
//! follows the chat-completions SSE format. Reasoning tokens reported by the
//! provider (`delta.reasoning` / `delta.reasoning_content`) are surfaced as
//! `DeltaKind::Reasoning`; answer tokens as `DeltaKind::Content`.

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{ModelDelta, ModelRequest, Role};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Splits an SSE byte stream into complete lines.
///
/// Bytes are buffered until a `\n` arrives and only whole lines are decoded,
/// so a multi-byte character split across network chunks stays intact.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Return the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string())
    }
}

/// Outcome of parsing one SSE line.
#[derive(Debug, PartialEq)]
enum SseLine {
    Deltas(Vec<ModelDelta>),
    Done,
    Skip,
}

/// Upper bound on any single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// OpenAI-compatible streaming provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    label: String,
    include_reasoning: bool,
    temperature: f32,
    max_tokens: Option<usize>,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Reads the API key from the environment variable named in `config.api_key_env`.
    /// Local endpoints (localhost) do not require a key.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.resolved_base_url();
        let is_local = base_url.contains("localhost") || base_url.contains("127.0.0.1");

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local provider; using dummy bearer token");
                    Some("local".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| LlmError::MissingApiKey {
                var: config.api_key_env.clone(),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("inquest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            api_key,
            model: config.model.clone(),
            label: config.provider.clone(),
            include_reasoning: config.include_reasoning,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs.max(1),
            max_retries: config.max_retries,
        })
    }

    /// Build the chat-completions request body.
    fn request_body(&self, request: &ModelRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for msg in &request.messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": msg.content }));
        }

        let temperature = request.temperature.unwrap_or(self.temperature);
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "stream": true,
        });
        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if self.include_reasoning {
            body["include_reasoning"] = json!(true);
        }
        body
    }

    /// Parse a single SSE line into deltas.
    fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(SseLine::Skip);
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(SseLine::Skip);
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            return Ok(SseLine::Done);
        }
        let value: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable stream chunk");
                return Ok(SseLine::Skip);
            }
        };
        if let Some(err) = value.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("provider reported an error mid-stream")
                .to_string();
            return Err(LlmError::Streaming { message });
        }
        Ok(SseLine::Deltas(Self::deltas_from_chunk(&value)))
    }

    /// Extract reasoning and content deltas from one chunk, reasoning first.
    fn deltas_from_chunk(chunk: &Value) -> Vec<ModelDelta> {
        let mut out = Vec::new();
        let Some(delta) = chunk
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
        else {
            return out;
        };

        let reasoning = delta
            .get("reasoning")
            .or_else(|| delta.get("reasoning_content"))
            .and_then(|r| r.as_str());
        if let Some(text) = reasoning
            && !text.is_empty()
        {
            out.push(ModelDelta::reasoning(text));
        }
        if let Some(text) = delta.get("content").and_then(|c| c.as_str())
            && !text.is_empty()
        {
            out.push(ModelDelta::content(text));
        }
        out
    }

    /// Map an HTTP error response to an `LlmError`.
    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                LlmError::AuthFailed {
                    provider: self.label.clone(),
                }
            }
            429 => {
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            code if code >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }

    fn is_retryable(err: &LlmError) -> bool {
        match err {
            LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. } => {
                true
            }
            LlmError::ApiRequest { message } => message.starts_with("Server error"),
            _ => false,
        }
    }

    /// Delay before retry number `attempt + 1`, capped at [`MAX_BACKOFF_MS`].
    fn backoff_ms(err: &LlmError, attempt: u32) -> u64 {
        let ms = match err {
            LlmError::RateLimited { retry_after_secs } => retry_after_secs.saturating_mul(1000),
            _ => 500u64.saturating_mul(1u64 << attempt.min(16)),
        };
        ms.min(MAX_BACKOFF_MS)
    }

    /// Send the request, retrying transient failures. Nothing has been
    /// streamed yet at this point, so a retry cannot duplicate output.
    async fn open(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut attempt = 0;
        loop {
            let result = self.send_once(&url, body).await;
            match result {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.max_retries && Self::is_retryable(&e) => {
                    let backoff_ms = Self::backoff_ms(&e, attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        backoff_ms,
                        error = %e,
                        "Retrying model call after transient error"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, url: &str, body: &Value) -> Result<reqwest::Response, LlmError> {
        let send = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send();
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), send)
            .await
            .map_err(|_| LlmError::Timeout {
                timeout_secs: self.timeout_secs,
            })?
            .map_err(|e| LlmError::Connection {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(self.map_http_error(status, &body_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn stream(
        &self,
        request: ModelRequest,
        tx: mpsc::Sender<ModelDelta>,
    ) -> Result<(), LlmError> {
        let body = self.request_body(&request);
        let response = self.open(&body).await?;

        let mut bytes = response.bytes_stream();
        let mut lines = SseLineBuffer::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| LlmError::Streaming {
                message: format!("Failed to read stream: {}", e),
            })?;
            for line in lines.push(&chunk) {
                match Self::parse_sse_line(&line)? {
                    SseLine::Done => return Ok(()),
                    SseLine::Skip => {}
                    SseLine::Deltas(deltas) => {
                        for delta in deltas {
                            if tx.send(delta).await.is_err() {
                                debug!("Receiver dropped; abandoning model stream");
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
        if let Some(line) = lines.finish()
            && let SseLine::Deltas(deltas) = Self::parse_sse_line(&line)?
        {
            for delta in deltas {
                if tx.send(delta).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
