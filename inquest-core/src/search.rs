//! Search provider abstraction and the never-failing search adapter.
//!
//! Concrete backends live in `inquest-tools`; the engine only ever talks to a
//! [`SearchAdapter`], which turns every backend failure into an empty result
//! plus a note for the caller to surface as a status event.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::SearchHit;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// A web search backend: query in, normalized hits out.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;

    /// Short backend name for logs and `/health`.
    fn name(&self) -> &str;
}

/// Result of one adapter call. `note` is set when the backend failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub note: Option<String>,
}

impl SearchOutcome {
    fn failed(note: String) -> Self {
        Self {
            hits: Vec::new(),
            note: Some(note),
        }
    }
}

/// Wraps a [`SearchProvider`] so that searching never fails.
#[derive(Clone)]
pub struct SearchAdapter {
    provider: Arc<dyn SearchProvider>,
    timeout: Duration,
    max_query_chars: usize,
}

impl SearchAdapter {
    pub fn new(provider: Arc<dyn SearchProvider>, config: &SearchConfig) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_query_chars: config.max_query_chars.max(1),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one query. Provider errors, timeouts, and malformed hits never escape.
    pub async fn search(&self, query: &str, limit: usize) -> SearchOutcome {
        let query = normalize_query(query, self.max_query_chars);
        if query.is_empty() || limit == 0 {
            return SearchOutcome::default();
        }

        let call = self.provider.search(&query, limit);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match result {
            Ok(hits) => {
                let hits = clean_hits(hits, limit);
                debug!(query = %query, hits = hits.len(), provider = self.provider.name(), "Search completed");
                SearchOutcome { hits, note: None }
            }
            Err(e) => {
                warn!(query = %query, provider = self.provider.name(), error = %e, "Search failed");
                SearchOutcome::failed(format!("Search for \"{}\" failed: {}", query, e))
            }
        }
    }
}

/// Collapse whitespace runs and cap the query at `max_chars` characters.
pub fn normalize_query(query: &str, max_chars: usize) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((idx, _)) => collapsed[..idx].trim_end().to_string(),
        None => collapsed,
    }
}

/// Drop hits without a URL, dedup by URL, and cap at `limit`.
fn clean_hits(hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter_map(|mut hit| {
            hit.url = hit.url.trim().to_string();
            if hit.url.is_empty() || !seen.insert(hit.url.clone()) {
                return None;
            }
            Some(hit)
        })
        .take(limit)
        .collect()
}

/// A backend that never finds anything. Selected with `provider = "none"`.
#[derive(Debug, Default)]
pub struct NoSearch;

#[async_trait]
impl SearchProvider for NoSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}

type SearchHandler = dyn Fn(&str) -> Result<Vec<SearchHit>, SearchError> + Send + Sync;

/// A scripted backend for tests.
pub struct MockSearchProvider {
    handler: Box<SearchHandler>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockSearchProvider {
    /// Every query returns the same hits.
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self::with_handler(move |_| Ok(hits.clone()))
    }

    /// Every query returns nothing.
    pub fn empty() -> Self {
        Self::with_hits(Vec::new())
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<SearchHit>, SearchError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each query.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries received, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(query)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
