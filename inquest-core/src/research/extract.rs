//! Incremental structured-output extraction.
//!
//! Model output is parsed after every content delta. Most attempts fail on
//! partial text and are discarded; the last successful parse is kept as the
//! result so far.

use serde::de::DeserializeOwned;
use tracing::{debug, trace};

/// Strip a markdown code-fence wrapper around a structured payload.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("json"))
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Best-effort "latest known good" parser over an accumulating text.
#[derive(Debug)]
pub struct StructuredExtractor<T> {
    text: String,
    current: Option<T>,
    attempts: usize,
    failures: usize,
}

impl<T> Default for StructuredExtractor<T> {
    fn default() -> Self {
        Self {
            text: String::new(),
            current: None,
            attempts: 0,
            failures: 0,
        }
    }
}

impl<T: DeserializeOwned> StructuredExtractor<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a content delta and re-parse the whole text.
    ///
    /// Returns true when the current value was replaced.
    pub fn push(&mut self, delta: &str) -> bool {
        self.text.push_str(delta);
        self.attempts += 1;
        match serde_json::from_str::<T>(strip_code_fence(&self.text)) {
            Ok(value) => {
                self.current = Some(value);
                true
            }
            Err(e) => {
                self.failures += 1;
                trace!(attempt = self.attempts, error = %e, "Partial output not yet parseable");
                false
            }
        }
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// The last successful parse, if any.
    pub fn into_value(self) -> Option<T> {
        self.current
    }

    /// The last successful parse, or `default` when none ever succeeded.
    pub fn finish_or(self, default: T) -> T {
        match self.current {
            Some(value) => value,
            None => {
                debug!(
                    attempts = self.attempts,
                    chars = self.text.chars().count(),
                    "No structured value extracted, using default"
                );
                default
            }
        }
    }
}
