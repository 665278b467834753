//! DuckDuckGo instant-answer backend. No API key required.
//!
//! The instant-answer API is not a full web index: it returns an abstract plus
//! related topics, which is usually enough for a few snippets per query.

use crate::get_json;
use async_trait::async_trait;
use inquest_core::error::SearchError;
use inquest_core::search::SearchProvider;
use inquest_core::types::SearchHit;
use serde_json::Value;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.duckduckgo.com/";

pub struct DuckDuckGoSearch {
    endpoint: String,
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(endpoint: Option<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            client,
        }
    }

    fn request_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.endpoint,
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let body = get_json(self.client.get(self.request_url(query))).await?;
        let hits = parse_response(&body, limit);
        debug!(query, hits = hits.len(), "DuckDuckGo search returned");
        Ok(hits)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

/// Abstract first, then direct results, then related topics (groups flattened).
fn parse_response(body: &Value, limit: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = str_field(body, "AbstractText");
    let abstract_url = str_field(body, "AbstractURL");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let title = match str_field(body, "Heading") {
            "" => str_field(body, "AbstractSource"),
            heading => heading,
        };
        hits.push(SearchHit::new(abstract_url, title, abstract_text));
    }

    for key in ["Results", "RelatedTopics"] {
        if let Some(topics) = body.get(key).and_then(Value::as_array) {
            collect_topics(topics, &mut hits);
        }
    }

    hits.truncate(limit);
    hits
}

fn collect_topics(topics: &[Value], hits: &mut Vec<SearchHit>) {
    for topic in topics {
        // Category groups nest their entries under "Topics".
        if let Some(nested) = topic.get("Topics").and_then(Value::as_array) {
            collect_topics(nested, hits);
            continue;
        }
        let text = str_field(topic, "Text");
        let url = str_field(topic, "FirstURL");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text);
        hits.push(SearchHit::new(url, title, text));
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("").trim()
}
