//! Accumulated research knowledge.
//!
//! `ResearchState` only grows. Branches work on snapshots and hand their state
//! back to the level that spawned them, which merges by set union.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An insertion-ordered set keyed by a normalized form of each item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OrderedSet {
    items: Vec<String>,
    keys: HashSet<String>,
}

impl OrderedSet {
    fn insert(&mut self, item: String, key: String) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        self.items.push(item);
        true
    }
}

/// Deduplicated learnings and visited URLs, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResearchState {
    learnings: OrderedSet,
    visited_urls: OrderedSet,
}

impl ResearchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a learning. Returns false for blanks and duplicates.
    pub fn insert_learning(&mut self, learning: &str) -> bool {
        let learning = learning.trim();
        if learning.is_empty() {
            return false;
        }
        self.learnings
            .insert(learning.to_string(), learning.to_string())
    }

    /// Add a URL. Returns false for blanks and duplicates after normalization.
    pub fn insert_url(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        self.visited_urls.insert(url.to_string(), normalize_url(url))
    }

    pub fn extend_learnings<I, S>(&mut self, learnings: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        learnings
            .into_iter()
            .filter(|l| self.insert_learning(l.as_ref()))
            .count()
    }

    pub fn extend_urls<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .filter(|u| self.insert_url(u.as_ref()))
            .count()
    }

    /// Union `other` into `self`, keeping first-seen order.
    pub fn merge(&mut self, other: &ResearchState) {
        self.extend_learnings(other.learnings());
        self.extend_urls(other.visited_urls());
    }

    /// Copy handed to a branch.
    pub fn snapshot(&self) -> ResearchState {
        self.clone()
    }

    pub fn learnings(&self) -> &[String] {
        &self.learnings.items
    }

    pub fn visited_urls(&self) -> &[String] {
        &self.visited_urls.items
    }

    pub fn into_outcome(self) -> ResearchOutcome {
        ResearchOutcome {
            learnings: self.learnings.items,
            visited_urls: self.visited_urls.items,
        }
    }
}

/// Dedup key for a URL: parsed form without fragment (scheme and host
/// lower-cased by the parser), or the trimmed text if it does not parse.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Final result of the research phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutcome {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_learnings_dedup_and_order() {
        let mut state = ResearchState::new();
        assert!(state.insert_learning("b"));
        assert!(state.insert_learning(" a "));
        assert!(!state.insert_learning("b"));
        assert!(!state.insert_learning("a"));
        assert!(!state.insert_learning("   "));
        assert_eq!(state.learnings(), &["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_url_normalization() {
        let mut state = ResearchState::new();
        assert!(state.insert_url("https://Example.com/page#intro"));
        assert!(!state.insert_url("https://example.com/page"));
        assert!(!state.insert_url("HTTPS://EXAMPLE.COM/page#other"));
        assert!(state.insert_url("https://example.com/Page"));
        assert!(state.insert_url("not a url"));
        assert!(!state.insert_url(" not a url "));
        assert_eq!(state.visited_urls().len(), 3);
        // First-seen spelling is kept for display.
        assert_eq!(state.visited_urls()[0], "https://Example.com/page#intro");
    }

    #[test]
    fn test_merge_is_union() {
        let mut parent = ResearchState::new();
        parent.extend_learnings(["x", "y"]);
        parent.insert_url("https://a.example/");

        let mut branch = parent.snapshot();
        branch.extend_learnings(["y", "z"]);
        branch.extend_urls(["https://a.example/", "https://b.example/"]);

        parent.merge(&branch);
        parent.merge(&branch);
        let outcome = parent.into_outcome();
        assert_eq!(outcome.learnings, vec!["x", "y", "z"]);
        assert_eq!(
            outcome.visited_urls,
            vec!["https://a.example/", "https://b.example/"]
        );
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let mut state = ResearchState::new();
        state.insert_url("https://a.example/");
        let json = serde_json::to_value(state.into_outcome()).unwrap();
        assert!(json.get("visitedUrls").is_some());
    }
}
