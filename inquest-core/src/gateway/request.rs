//! Inbound request bodies and their validation.
//!
//! Validation happens before any streaming starts; every failure becomes a
//! `400` with a `{"error": "..."}` JSON body.

use crate::config::ResearchConfig;
use crate::error::RequestError;
use crate::mux::WireFormat;
use crate::types::{ChatMessage, ResearchRequest, Role};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/research`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResearchRequestBody {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub breadth: Option<i64>,
    #[serde(default)]
    pub depth: Option<i64>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
}

/// `?format=markers|events`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatQuery {
    #[serde(default)]
    pub format: Option<WireFormat>,
}

/// JSON error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error response sent before streaming starts.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl ResearchRequestBody {
    /// Resolve the topic and budgets into a validated request.
    ///
    /// An explicit non-blank `topic` wins; otherwise the last user message is used.
    pub fn validate(&self, config: &ResearchConfig) -> Result<ResearchRequest, RequestError> {
        let topic = match self.topic.as_deref().map(str::trim) {
            Some(topic) if !topic.is_empty() => topic.to_string(),
            _ => topic_from_messages(self.messages.as_deref(), self.topic.is_some())?,
        };

        let breadth = check_budget(self.breadth, config.default_breadth, config.max_breadth)
            .map_err(|value| RequestError::InvalidBreadth {
                value,
                max: config.max_breadth,
            })?;
        let depth = check_budget(self.depth, config.default_depth, config.max_depth).map_err(
            |value| RequestError::InvalidDepth {
                value,
                max: config.max_depth,
            },
        )?;

        Ok(ResearchRequest {
            topic,
            breadth,
            depth,
        })
    }
}

impl ChatRequestBody {
    /// The conversation to send to the model. Must contain a user message.
    pub fn validate(&self) -> Result<Vec<ChatMessage>, RequestError> {
        let messages = match self.messages.as_deref() {
            Some(messages) if !messages.is_empty() => messages,
            _ => return Err(RequestError::MissingMessages),
        };
        if !messages.iter().any(|m| m.role == Role::User) {
            return Err(RequestError::NoUserMessage);
        }
        Ok(messages.to_vec())
    }
}

fn topic_from_messages(
    messages: Option<&[ChatMessage]>,
    topic_given: bool,
) -> Result<String, RequestError> {
    let messages = match messages {
        Some(messages) if !messages.is_empty() => messages,
        _ if topic_given => return Err(RequestError::EmptyTopic),
        _ => return Err(RequestError::MissingMessages),
    };
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .ok_or(RequestError::NoUserMessage)?;
    let topic = last_user.content.trim();
    if topic.is_empty() {
        return Err(RequestError::EmptyTopic);
    }
    Ok(topic.to_string())
}

fn check_budget(value: Option<i64>, default: usize, max: usize) -> Result<usize, i64> {
    let Some(value) = value else {
        return Ok(default.clamp(1, max.max(1)));
    };
    match usize::try_from(value) {
        Ok(v) if (1..=max).contains(&v) => Ok(v),
        _ => Err(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(json: &str) -> ResearchRequestBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_topic_from_last_user_message() {
        let req = body(
            r#"{"messages":[
                {"role":"user","content":"first question"},
                {"role":"assistant","content":"answer"},
                {"role":"user","content":"  rust async runtimes  "}
            ]}"#,
        )
        .validate(&ResearchConfig::default())
        .unwrap();
        assert_eq!(
            req,
            ResearchRequest {
                topic: "rust async runtimes".into(),
                breadth: 3,
                depth: 2,
            }
        );
    }

    #[test]
    fn test_explicit_topic_and_budgets() {
        let req = body(r#"{"topic":"wasm","breadth":4,"depth":1}"#)
            .validate(&ResearchConfig::default())
            .unwrap();
        assert_eq!(req.topic, "wasm");
        assert_eq!(req.breadth, 4);
        assert_eq!(req.depth, 1);
    }

    #[test]
    fn test_validation_errors() {
        let config = ResearchConfig::default();
        assert_eq!(
            body("{}").validate(&config),
            Err(RequestError::MissingMessages)
        );
        assert_eq!(
            body(r#"{"messages":[]}"#).validate(&config),
            Err(RequestError::MissingMessages)
        );
        assert_eq!(
            body(r#"{"messages":[{"role":"assistant","content":"hi"}]}"#).validate(&config),
            Err(RequestError::NoUserMessage)
        );
        assert_eq!(
            body(r#"{"messages":[{"role":"user","content":"   "}]}"#).validate(&config),
            Err(RequestError::EmptyTopic)
        );
        assert_eq!(
            body(r#"{"topic":"  "}"#).validate(&config),
            Err(RequestError::EmptyTopic)
        );
        assert_eq!(
            body(r#"{"topic":"x","breadth":0}"#).validate(&config),
            Err(RequestError::InvalidBreadth { value: 0, max: 8 })
        );
        assert_eq!(
            body(r#"{"topic":"x","depth":-1}"#).validate(&config),
            Err(RequestError::InvalidDepth { value: -1, max: 4 })
        );
        assert_eq!(
            body(r#"{"topic":"x","depth":5}"#).validate(&config),
            Err(RequestError::InvalidDepth { value: 5, max: 4 })
        );
    }

    #[test]
    fn test_chat_validation() {
        let ok: ChatRequestBody =
            serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert_eq!(ok.validate().unwrap().len(), 1);

        let empty: ChatRequestBody = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.validate(), Err(RequestError::MissingMessages));
    }
}
