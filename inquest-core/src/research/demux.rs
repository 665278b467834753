//! Token channel demultiplexer.
//!
//! Splits one model's raw delta stream into reasoning and content events using
//! inline open/close markers. Deltas are fed one at a time; a marker may be
//! split across any number of deltas, so a possible marker prefix at the end of
//! the buffer is held back until it is either completed or ruled out.

use crate::types::{DeltaKind, ModelDelta, StreamEvent};

/// Which channel text is currently routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    Content,
    Reasoning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Open,
    Close,
}

/// Explicit two-state demultiplexer over a stream of text deltas.
#[derive(Debug, Clone)]
pub struct TokenDemux {
    open: String,
    close: String,
    channel: Channel,
    lookahead: String,
    unterminated: bool,
}

impl Default for TokenDemux {
    fn default() -> Self {
        Self::new("<think>", "</think>")
    }
}

impl TokenDemux {
    /// Create a demultiplexer for the given marker pair. An empty marker never matches.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            channel: Channel::Content,
            lookahead: String::new(),
            unterminated: false,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Bytes currently held back as a possible marker prefix.
    pub fn held_back(&self) -> &str {
        &self.lookahead
    }

    /// True if `finish` had to close a reasoning span the model left open.
    pub fn was_unterminated(&self) -> bool {
        self.unterminated
    }

    /// Feed raw text that may contain inline markers.
    pub fn push(&mut self, text: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        self.lookahead.push_str(text);
        self.scan(&mut out);
        out
    }

    /// Feed one provider delta.
    ///
    /// Content deltas are scanned for markers. Reasoning deltas were already
    /// separated by the provider: held-back text is flushed to the active
    /// channel first, then the delta is emitted as reasoning without a state change.
    pub fn push_delta(&mut self, delta: &ModelDelta) -> Vec<StreamEvent> {
        match delta.kind {
            DeltaKind::Content => self.push(&delta.text),
            DeltaKind::Reasoning => {
                let mut out = Vec::new();
                let held = std::mem::take(&mut self.lookahead);
                emit(&mut out, self.channel, &held);
                emit(&mut out, Channel::Reasoning, &delta.text);
                out
            }
        }
    }

    /// End of stream: flush held-back text and close an open reasoning span.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        let held = std::mem::take(&mut self.lookahead);
        emit(&mut out, self.channel, &held);
        if self.channel == Channel::Reasoning {
            self.unterminated = true;
            self.channel = Channel::Content;
        }
        out
    }

    fn scan(&mut self, out: &mut Vec<StreamEvent>) {
        let buf = std::mem::take(&mut self.lookahead);
        let mut start = 0;
        let mut idx = 0;

        while idx < buf.len() {
            let rest = &buf[idx..];
            if let Some((marker, len)) = self.marker_at(rest) {
                emit(out, self.channel, &buf[start..idx]);
                self.channel = match marker {
                    Marker::Open => Channel::Reasoning,
                    Marker::Close => Channel::Content,
                };
                idx += len;
                start = idx;
                continue;
            }
            if self.is_partial_marker(rest) {
                break;
            }
            idx += rest.chars().next().map_or(1, char::len_utf8);
        }

        emit(out, self.channel, &buf[start..idx]);
        self.lookahead = buf[idx..].to_string();
    }

    fn marker_at(&self, rest: &str) -> Option<(Marker, usize)> {
        if !self.open.is_empty() && rest.starts_with(&self.open) {
            return Some((Marker::Open, self.open.len()));
        }
        if !self.close.is_empty() && rest.starts_with(&self.close) {
            return Some((Marker::Close, self.close.len()));
        }
        None
    }

    fn is_partial_marker(&self, rest: &str) -> bool {
        [&self.open, &self.close]
            .iter()
            .any(|m| !m.is_empty() && rest.len() < m.len() && m.starts_with(rest))
    }
}

/// Append `text` to `out` on `channel`, coalescing with a trailing event of the same channel.
fn emit(out: &mut Vec<StreamEvent>, channel: Channel, text: &str) {
    if text.is_empty() {
        return;
    }
    match (out.last_mut(), channel) {
        (Some(StreamEvent::ReasoningDelta(prev)), Channel::Reasoning)
        | (Some(StreamEvent::ContentDelta(prev)), Channel::Content) => prev.push_str(text),
        (_, Channel::Reasoning) => out.push(StreamEvent::ReasoningDelta(text.to_string())),
        (_, Channel::Content) => out.push(StreamEvent::ContentDelta(text.to_string())),
    }
}

/// Run a whole chunk sequence through a default demultiplexer.
pub fn demux_all<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Vec<StreamEvent> {
    let mut demux = TokenDemux::default();
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(demux.push(chunk));
    }
    out.extend(demux.finish());
    out
}
