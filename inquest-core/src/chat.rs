//! Plain streaming chat over a whole conversation.

use crate::brain::LlmProvider;
use crate::error::ResearchError;
use crate::mux::EventSink;
use crate::research::{Delivery, Emitter, Markers, ModelCaller};
use crate::types::{ChatMessage, ModelRequest, RunEvent, Stage, StreamEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Sampling temperature for chat replies.
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// Token cap for one chat reply.
pub const CHAT_MAX_TOKENS: usize = 1000;

/// Written when the model finished without producing any reasoning or answer text.
pub const EMPTY_REPLY_FALLBACK: &str =
    "Sorry, I couldn't generate a reply. Please try again or use a different model.";

/// Stream one chat reply into `sink` and return the answer text.
///
/// Model errors become a terminal `Error` event rather than an `Err`; only
/// cancellation is returned as an error.
pub async fn run_chat(
    provider: Arc<dyn LlmProvider>,
    markers: Markers,
    messages: Vec<ChatMessage>,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<String, ResearchError> {
    let caller = ModelCaller::new(provider, markers);
    let mut emitter = Emitter::new(sink.clone(), Delivery::Live);
    let request = ModelRequest {
        messages,
        temperature: Some(CHAT_TEMPERATURE),
        max_tokens: Some(CHAT_MAX_TOKENS),
        ..ModelRequest::default()
    };
    debug!(model = caller.model_name(), "Starting chat reply");

    match caller
        .call(request, Stage::Chat, &mut emitter, cancel, |_| {})
        .await
    {
        Ok(output) if output.content.trim().is_empty() && output.reasoning_chars == 0 => {
            emitter
                .emit(RunEvent::new(
                    Stage::Chat,
                    StreamEvent::ContentDelta(EMPTY_REPLY_FALLBACK.to_string()),
                ))
                .await?;
            Ok(EMPTY_REPLY_FALLBACK.to_string())
        }
        Ok(output) => Ok(output.content),
        Err(ResearchError::Cancelled) => Err(ResearchError::Cancelled),
        Err(e) => {
            warn!(error = %e, "Chat reply failed");
            emitter
                .emit(RunEvent::new(Stage::Chat, StreamEvent::Error(e.to_string())))
                .await?;
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{MockLlmProvider, MockReply};
    use crate::mux::{OutputMultiplexer, WireFormat};

    async fn render(provider: MockLlmProvider) -> (String, String) {
        render_shared(Arc::new(provider)).await
    }

    async fn render_shared(provider: Arc<MockLlmProvider>) -> (String, String) {
        let cancel = CancellationToken::new();
        let (sink, mut rx) = EventSink::channel(256, cancel.clone());
        let reply = run_chat(
            provider,
            Markers::default(),
            vec![ChatMessage::user("hi")],
            &sink,
            &cancel,
        )
        .await
        .unwrap();
        drop(sink);

        let mut mux = OutputMultiplexer::new(WireFormat::Markers);
        let mut out = String::new();
        while let Some(ev) = rx.recv().await {
            out.push_str(&mux.encode(&ev));
        }
        out.push_str(&mux.finish());
        (reply, out)
    }

    #[tokio::test]
    async fn test_chat_reasoning_then_answer() {
        let provider =
            MockLlmProvider::with_handler(|_| Ok(MockReply::with_reasoning("hmm", "Hello!")));
        let (reply, out) = render(provider).await;
        assert_eq!(reply, "Hello!");
        assert_eq!(out, "<think>\nhmm\n</think>\n\nHello!");
    }

    #[tokio::test]
    async fn test_chat_empty_reply_uses_fallback() {
        let provider = MockLlmProvider::with_response("");
        let (reply, out) = render(provider).await;
        assert_eq!(reply, EMPTY_REPLY_FALLBACK);
        assert_eq!(out, EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn test_chat_reasoning_only_reply_is_kept() {
        let provider =
            MockLlmProvider::with_handler(|_| Ok(MockReply::with_reasoning("only thoughts", "")));
        let (reply, out) = render(provider).await;
        assert!(reply.is_empty());
        assert!(!out.contains(EMPTY_REPLY_FALLBACK));
        assert!(out.contains("only thoughts"));
    }

    #[tokio::test]
    async fn test_chat_request_uses_chat_sampling() {
        let provider = Arc::new(MockLlmProvider::with_response("Hi"));
        render_shared(provider.clone()).await;
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(CHAT_TEMPERATURE));
        assert_eq!(requests[0].max_tokens, Some(CHAT_MAX_TOKENS));
    }

    #[tokio::test]
    async fn test_chat_model_error_becomes_error_event() {
        let provider = MockLlmProvider::with_handler(|_| {
            Err(crate::error::LlmError::AuthFailed {
                provider: "openrouter".into(),
            })
        });
        let (reply, out) = render(provider).await;
        assert!(reply.is_empty());
        assert!(out.contains("**Error:**"));
    }
}
