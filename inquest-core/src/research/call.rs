//! One streamed model call, wired through the demultiplexer to the event sink.

use super::demux::TokenDemux;
use super::extract::StructuredExtractor;
use crate::brain::LlmProvider;
use crate::error::ResearchError;
use crate::mux::EventSink;
use crate::types::{ModelRequest, RunEvent, Stage, StreamEvent};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a producer's events reach the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every event is forwarded as soon as it exists.
    Live,
    /// Events are held and flushed as one contiguous batch per model call.
    Batched,
}

/// A producer's handle on the run's event sink.
pub struct Emitter {
    sink: EventSink,
    delivery: Delivery,
    pending: Vec<RunEvent>,
}

impl Emitter {
    pub fn new(sink: EventSink, delivery: Delivery) -> Self {
        Self {
            sink,
            delivery,
            pending: Vec::new(),
        }
    }

    /// A fresh emitter on the same sink, for a child branch.
    pub fn fork(&self, delivery: Delivery) -> Self {
        Self::new(self.sink.clone(), delivery)
    }

    pub async fn emit(&mut self, event: RunEvent) -> Result<(), ResearchError> {
        match self.delivery {
            Delivery::Live => self.sink.emit(event).await,
            Delivery::Batched => {
                self.pending.push(event);
                Ok(())
            }
        }
    }

    pub async fn status(&mut self, stage: Stage, note: impl Into<String>) -> Result<(), ResearchError> {
        self.emit(RunEvent::status(stage, note)).await
    }

    /// Send everything held so far as one batch.
    pub async fn flush(&mut self) -> Result<(), ResearchError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        self.sink.emit_all(batch).await
    }
}

/// What a finished call produced.
#[derive(Debug, Clone, Default)]
pub struct CallOutput {
    /// Everything on the content channel.
    pub content: String,
    /// Characters routed to the reasoning channel.
    pub reasoning_chars: usize,
}

/// Inline marker pair used to split raw model text.
#[derive(Debug, Clone)]
pub struct Markers {
    pub open: String,
    pub close: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            open: "<think>".to_string(),
            close: "</think>".to_string(),
        }
    }
}

/// Stream one model call into `emitter`, tagging events with `stage`.
///
/// `on_content` sees every content-channel delta in order, after marker
/// splitting. The call is abandoned when `cancel` fires. A provider error is
/// returned after whatever was already streamed has been delivered.
pub async fn stream_call<F>(
    provider: &dyn LlmProvider,
    markers: &Markers,
    request: ModelRequest,
    stage: Stage,
    emitter: &mut Emitter,
    cancel: &CancellationToken,
    mut on_content: F,
) -> Result<CallOutput, ResearchError>
where
    F: FnMut(&str),
{
    let (tx, rx) = mpsc::channel(64);
    let mut demux = TokenDemux::new(markers.open.as_str(), markers.close.as_str());
    let mut output = CallOutput::default();

    let producer = provider.stream(request, tx);
    let consumer = async {
        let mut rx = rx;
        while let Some(delta) = rx.recv().await {
            for event in demux.push_delta(&delta) {
                forward(stage, event, emitter, &mut output, &mut on_content).await?;
            }
        }
        for event in demux.finish() {
            forward(stage, event, emitter, &mut output, &mut on_content).await?;
        }
        Ok::<(), ResearchError>(())
    };

    let (streamed, consumed) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
        pair = async { tokio::join!(producer, consumer) } => pair,
    };
    consumed?;
    emitter.flush().await?;
    streamed?;

    if demux.was_unterminated() {
        debug!(%stage, "Model left a reasoning span open; closed it at end of stream");
    }
    Ok(output)
}

/// Issues streamed calls against one provider with one marker pair.
#[derive(Clone)]
pub struct ModelCaller {
    provider: Arc<dyn LlmProvider>,
    markers: Markers,
}

impl ModelCaller {
    pub fn new(provider: Arc<dyn LlmProvider>, markers: Markers) -> Self {
        Self { provider, markers }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub async fn call<F>(
        &self,
        request: ModelRequest,
        stage: Stage,
        emitter: &mut Emitter,
        cancel: &CancellationToken,
        on_content: F,
    ) -> Result<CallOutput, ResearchError>
    where
        F: FnMut(&str),
    {
        stream_call(
            self.provider.as_ref(),
            &self.markers,
            request,
            stage,
            emitter,
            cancel,
            on_content,
        )
        .await
    }

    /// Stream a call and extract a structured value from its content channel,
    /// re-parsing after every delta. Falls back to `default` if nothing parsed.
    pub async fn extract<T: DeserializeOwned>(
        &self,
        request: ModelRequest,
        stage: Stage,
        emitter: &mut Emitter,
        cancel: &CancellationToken,
        default: T,
    ) -> Result<T, ResearchError> {
        let mut extractor = StructuredExtractor::<T>::new();
        self.call(request, stage, emitter, cancel, |text| {
            extractor.push(text);
        })
        .await?;
        Ok(extractor.finish_or(default))
    }
}

async fn forward<F>(
    stage: Stage,
    event: StreamEvent,
    emitter: &mut Emitter,
    output: &mut CallOutput,
    on_content: &mut F,
) -> Result<(), ResearchError>
where
    F: FnMut(&str),
{
    match &event {
        StreamEvent::ContentDelta(text) => {
            output.content.push_str(text);
            on_content(text);
        }
        StreamEvent::ReasoningDelta(text) => output.reasoning_chars += text.chars().count(),
        _ => {}
    }
    emitter.emit(RunEvent::new(stage, event)).await
}
