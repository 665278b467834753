//! Bing Web Search v7 backend.

use crate::get_json;
use async_trait::async_trait;
use inquest_core::error::SearchError;
use inquest_core::search::SearchProvider;
use inquest_core::types::SearchHit;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
/// Bing rejects `count` above this.
const MAX_COUNT: usize = 50;

/// Web page results from the Bing Web Search API.
pub struct BingSearch {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl BingSearch {
    pub fn new(api_key: String, endpoint: Option<String>, client: reqwest::Client) -> Self {
        Self {
            api_key,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for BingSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let count = limit.clamp(1, MAX_COUNT).to_string();
        let request = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("responseFilter", "Webpages"),
                ("textFormat", "HTML"),
            ]);
        let body = get_json(request).await?;
        let hits = parse_response(body)?;
        debug!(query, hits = hits.len(), "Bing search returned");
        Ok(hits)
    }

    fn name(&self) -> &str {
        "bing"
    }
}

#[derive(Debug, Default, Deserialize)]
struct BingResponse {
    #[serde(rename = "webPages", default)]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Default, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
struct WebPage {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    snippet: String,
}

/// Map a response body to hits. A body without `webPages` means no results.
fn parse_response(body: serde_json::Value) -> Result<Vec<SearchHit>, SearchError> {
    let response: BingResponse = serde_json::from_value(body).map_err(|e| SearchError::Parse {
        message: e.to_string(),
    })?;
    Ok(response
        .web_pages
        .unwrap_or_default()
        .value
        .into_iter()
        .map(|page| SearchHit::new(page.url, plain_text(&page.name), plain_text(&page.snippet)))
        .collect())
}

/// Strip the inline highlight tags of `textFormat=HTML` and decode entities.
fn plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
