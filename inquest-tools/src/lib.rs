//! # Inquest Tools
//!
//! Concrete web search backends for the Inquest research engine, and the
//! factory that picks one from configuration.

pub mod bing;
pub mod duckduckgo;

pub use bing::BingSearch;
pub use duckduckgo::DuckDuckGoSearch;

use inquest_core::config::SearchConfig;
use inquest_core::error::SearchError;
use inquest_core::search::{NoSearch, SearchProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const USER_AGENT: &str = concat!("Inquest/", env!("CARGO_PKG_VERSION"));

/// Build the search backend named by `config.provider`.
///
/// `bing` reads its key from the environment variable named by
/// `config.api_key_env` and fails if it is unset.
pub fn build_search_provider(config: &SearchConfig) -> Result<Arc<dyn SearchProvider>, SearchError> {
    let provider: Arc<dyn SearchProvider> = match config.provider.trim().to_ascii_lowercase().as_str() {
        "bing" => {
            let key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| SearchError::MissingKey {
                    var: config.api_key_env.clone(),
                })?;
            Arc::new(BingSearch::new(key, config.endpoint.clone(), client(config)?))
        }
        "duckduckgo" | "ddg" => Arc::new(DuckDuckGoSearch::new(config.endpoint.clone(), client(config)?)),
        "none" | "off" => Arc::new(NoSearch),
        other => {
            return Err(SearchError::Request {
                message: format!(
                    "unknown search provider '{}' (expected bing, duckduckgo or none)",
                    other
                ),
            });
        }
    };
    info!(provider = provider.name(), "Search backend ready");
    Ok(provider)
}

fn client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SearchError::Request {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Send a GET and decode the JSON body, mapping failures to `SearchError`.
pub(crate) async fn get_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, SearchError> {
    let response = request.send().await.map_err(|e| SearchError::Request {
        message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Status {
            status: status.as_u16(),
        });
    }

    response.json().await.map_err(|e| SearchError::Parse {
        message: e.to_string(),
    })
}
