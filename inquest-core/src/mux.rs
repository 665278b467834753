//! Output multiplexer.
//!
//! Every producer in a run (planner, synthesizer and report calls, plus
//! orchestration status notes) writes `RunEvent`s into one [`EventSink`]. The
//! consumer side turns them into the outbound byte stream with an
//! [`OutputMultiplexer`] in the selected [`WireFormat`].

use crate::error::ResearchError;
use crate::types::{RunEvent, Stage, StreamEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outbound stream encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Plain text; reasoning spans wrapped in inline markers.
    #[default]
    Markers,
    /// Newline-delimited JSON records with a `type` discriminator.
    Events,
}

impl WireFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Markers => "text/event-stream; charset=utf-8",
            WireFormat::Events => "application/x-ndjson",
        }
    }
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markers" | "text" => Ok(WireFormat::Markers),
            "events" | "ndjson" | "json" => Ok(WireFormat::Events),
            other => Err(format!("unknown wire format '{}'", other)),
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::Markers => f.write_str("markers"),
            WireFormat::Events => f.write_str("events"),
        }
    }
}

/// Serializes run events into the outbound wire format.
///
/// In marker mode all research-stage output (plan and synthesize calls,
/// status notes) is wrapped in a single reasoning span, so a consumer sees
/// the whole research trace as "thinking" followed by the report.
#[derive(Debug)]
pub struct OutputMultiplexer {
    format: WireFormat,
    open_marker: String,
    close_marker: String,
    research_open: bool,
    reasoning_open: bool,
    at_line_start: bool,
}

impl OutputMultiplexer {
    pub fn new(format: WireFormat) -> Self {
        Self::with_markers(format, "<think>", "</think>")
    }

    pub fn with_markers(
        format: WireFormat,
        open_marker: impl Into<String>,
        close_marker: impl Into<String>,
    ) -> Self {
        Self {
            format,
            open_marker: open_marker.into(),
            close_marker: close_marker.into(),
            research_open: false,
            reasoning_open: false,
            at_line_start: true,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Encode one event. May return an empty string.
    pub fn encode(&mut self, event: &RunEvent) -> String {
        match self.format {
            WireFormat::Events => encode_record(event),
            WireFormat::Markers => {
                let mut out = String::new();
                self.encode_marked(event, &mut out);
                out
            }
        }
    }

    /// Close whatever span is still open.
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        if self.format == WireFormat::Markers {
            self.close_spans(&mut out);
        }
        out
    }

    fn encode_marked(&mut self, event: &RunEvent, out: &mut String) {
        match &event.event {
            StreamEvent::Error(text) => {
                self.close_spans(out);
                self.write(out, &format!("\n\n**Error:** {}\n", text));
            }
            StreamEvent::StatusNote(text) => {
                if !self.research_open && event.stage.is_research() {
                    self.open_research(out);
                }
                if !self.at_line_start {
                    self.write(out, "\n");
                }
                if self.research_open {
                    self.write(out, &format!("> {}\n", text));
                } else {
                    self.write(out, &format!("> {}\n\n", text));
                }
            }
            StreamEvent::ReasoningDelta(text) | StreamEvent::ContentDelta(text)
                if event.stage.is_research() =>
            {
                if !self.research_open {
                    self.open_research(out);
                }
                self.write(out, text);
            }
            StreamEvent::ReasoningDelta(text) => {
                self.close_research(out);
                if !self.reasoning_open {
                    let open = format!("{}\n", self.open_marker);
                    self.write(out, &open);
                    self.reasoning_open = true;
                }
                self.write(out, text);
            }
            StreamEvent::ContentDelta(text) => {
                self.close_research(out);
                self.close_reasoning(out);
                self.write(out, text);
            }
        }
    }

    fn open_research(&mut self, out: &mut String) {
        self.close_reasoning(out);
        let open = format!("{}\n", self.open_marker);
        self.write(out, &open);
        self.research_open = true;
    }

    fn close_research(&mut self, out: &mut String) {
        if self.research_open {
            self.write_close(out);
            self.research_open = false;
        }
    }

    fn close_reasoning(&mut self, out: &mut String) {
        if self.reasoning_open {
            self.write_close(out);
            self.reasoning_open = false;
        }
    }

    fn close_spans(&mut self, out: &mut String) {
        self.close_research(out);
        self.close_reasoning(out);
    }

    fn write_close(&mut self, out: &mut String) {
        if !self.at_line_start {
            self.write(out, "\n");
        }
        let close = format!("{}\n\n", self.close_marker);
        self.write(out, &close);
    }

    fn write(&mut self, out: &mut String, text: &str) {
        if let Some(last) = text.chars().last() {
            self.at_line_start = last == '\n';
            out.push_str(text);
        }
    }
}

fn encode_record(event: &RunEvent) -> String {
    let record = json!({
        "type": event.event.kind(),
        "stage": event.stage.to_string(),
        "text": event.event.text(),
    });
    format!("{}\n", record)
}

/// Shared producer handle for one run's events.
///
/// Cloned into every branch. A batch sent with [`EventSink::emit_all`] reaches
/// the receiver contiguously even when several branches emit at once. When
/// the receiver has gone away the run's token is cancelled.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<RunEvent>,
    gate: Arc<Mutex<()>>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Create a sink and the receiver the multiplexer drains.
    pub fn channel(buffer: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = Self {
            tx,
            gate: Arc::new(Mutex::new(())),
            cancel,
        };
        (sink, rx)
    }

    pub async fn emit(&self, event: RunEvent) -> Result<(), ResearchError> {
        let _gate = self.gate.lock().await;
        self.send(event).await
    }

    pub async fn status(&self, stage: Stage, note: impl Into<String>) -> Result<(), ResearchError> {
        self.emit(RunEvent::status(stage, note)).await
    }

    /// Send a batch without interleaving from other producers.
    pub async fn emit_all(&self, events: Vec<RunEvent>) -> Result<(), ResearchError> {
        if events.is_empty() {
            return Ok(());
        }
        let _gate = self.gate.lock().await;
        for event in events {
            self.send(event).await?;
        }
        Ok(())
    }

    async fn send(&self, event: RunEvent) -> Result<(), ResearchError> {
        if self.tx.send(event).await.is_err() {
            debug!("Event receiver closed; cancelling run");
            self.cancel.cancel();
            return Err(ResearchError::Cancelled);
        }
        Ok(())
    }
}
