//! Core types shared across the Inquest engine.

use serde::{Deserialize, Serialize};

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A request to a model for one streamed completion.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Provider default when unset.
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl ModelRequest {
    /// A single-turn request: one system instruction plus one user prompt.
    pub fn prompt(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            messages: vec![ChatMessage::user(prompt)],
            ..Self::default()
        }
    }

    /// The last user-authored message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}


/// Which channel a raw model delta was reported on by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Reasoning,
    Content,
}

/// One unit of raw model output, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDelta {
    pub kind: DeltaKind,
    pub text: String,
}

impl ModelDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Content,
            text: text.into(),
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: DeltaKind::Reasoning,
            text: text.into(),
        }
    }
}

/// The only externally observable unit of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ReasoningDelta(String),
    ContentDelta(String),
    StatusNote(String),
    Error(String),
}

impl StreamEvent {
    pub fn text(&self) -> &str {
        match self {
            StreamEvent::ReasoningDelta(t)
            | StreamEvent::ContentDelta(t)
            | StreamEvent::StatusNote(t)
            | StreamEvent::Error(t) => t,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::ReasoningDelta(_) => "reasoning",
            StreamEvent::ContentDelta(_) => "content",
            StreamEvent::StatusNote(_) => "status",
            StreamEvent::Error(_) => "error",
        }
    }
}

/// The part of a run that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Search,
    Synthesize,
    Report,
    Chat,
}

impl Stage {
    /// Stages whose output belongs to the intermediate research trace.
    pub fn is_research(&self) -> bool {
        matches!(self, Stage::Plan | Stage::Search | Stage::Synthesize)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Plan => "plan",
            Stage::Search => "search",
            Stage::Synthesize => "synthesize",
            Stage::Report => "report",
            Stage::Chat => "chat",
        };
        f.write_str(name)
    }
}

/// A stream event tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEvent {
    pub stage: Stage,
    pub event: StreamEvent,
}

impl RunEvent {
    pub fn new(stage: Stage, event: StreamEvent) -> Self {
        Self { stage, event }
    }

    pub fn status(stage: Stage, note: impl Into<String>) -> Self {
        Self::new(stage, StreamEvent::StatusNote(note.into()))
    }
}

/// A normalized search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
        }
    }
}

/// One search query produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub query: String,
    #[serde(rename = "researchGoal", default)]
    pub research_goal: String,
}

impl PlannedQuery {
    pub fn new(query: impl Into<String>, research_goal: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            research_goal: research_goal.into(),
        }
    }
}

/// A validated research request. Immutable for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    pub breadth: usize,
    pub depth: usize,
}
