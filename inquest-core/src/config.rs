//! Configuration system for Inquest.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides.
//! Configuration is loaded from the platform config dir (`config.toml`) and/or
//! `.inquest/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::mux::WireFormat;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InquestConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub server: ServerConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openrouter" or "openai" (any OpenAI-compatible endpoint).
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Maximum tokens to generate per call (provider default when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Ask the provider to stream its reasoning alongside the answer.
    pub include_reasoning: bool,
    /// Timeout for establishing a streamed call, in seconds.
    pub timeout_secs: u64,
    /// Retries for a call that fails before any output was streamed.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openrouter".to_string(),
            model: "google/gemini-2.0-flash-lite-preview-02-05:free".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: None,
            include_reasoning: true,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// Base URL for the configured provider.
    pub fn resolved_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com/v1".to_string(),
            _ => "https://openrouter.ai/api/v1".to_string(),
        }
    }
}

/// Web search backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Backend: "bing", "duckduckgo", or "none".
    pub provider: String,
    /// Environment variable name containing the search API key.
    pub api_key_env: String,
    /// Optional endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Hits requested per query.
    pub results_per_query: usize,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Queries longer than this are truncated before being sent.
    pub max_query_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: "bing".to_string(),
            api_key_env: "BING_SEARCH_API_KEY".to_string(),
            endpoint: None,
            results_per_query: 5,
            timeout_secs: 15,
            max_query_chars: 400,
        }
    }
}

/// Research orchestration budgets and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub default_breadth: usize,
    pub default_depth: usize,
    /// Upper bound accepted from requests.
    pub max_breadth: usize,
    /// Upper bound accepted from requests.
    pub max_depth: usize,
    /// Learnings requested from each synthesizer call.
    pub learnings_per_query: usize,
    /// Queries of one planning level processed at once. 1 = sequential.
    pub concurrency: usize,
    /// Inline marker that opens a reasoning span in raw model text.
    pub open_marker: String,
    /// Inline marker that closes a reasoning span in raw model text.
    pub close_marker: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            default_breadth: 3,
            default_depth: 2,
            max_breadth: 8,
            max_depth: 4,
            learnings_per_query: 3,
            concurrency: 1,
            open_marker: "<think>".to_string(),
            close_marker: "</think>".to_string(),
        }
    }
}

impl ResearchConfig {
    /// Validate this config and return human-readable warnings.
    ///
    /// Returns an empty Vec if the config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.concurrency == 0 {
            warnings.push("concurrency is 0; queries will be processed one at a time".to_string());
        }
        if self.default_breadth == 0 || self.default_breadth > self.max_breadth {
            warnings.push(format!(
                "default_breadth ({}) is outside 1..={}",
                self.default_breadth, self.max_breadth
            ));
        }
        if self.default_depth == 0 || self.default_depth > self.max_depth {
            warnings.push(format!(
                "default_depth ({}) is outside 1..={}",
                self.default_depth, self.max_depth
            ));
        }
        if self.open_marker.is_empty() || self.close_marker.is_empty() {
            warnings.push("reasoning markers must not be empty".to_string());
        } else if self.open_marker == self.close_marker {
            warnings.push("open_marker and close_marker are identical".to_string());
        }
        warnings
    }

    /// Effective worker count for one planning level.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Default outbound wire format for `/api/research`.
    pub wire_format: WireFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            wire_format: WireFormat::Markers,
        }
    }
}

/// Load configuration from all sources with layered merging.
///
/// Priority (highest first):
/// 1. Explicit overrides
/// 2. Environment variables (`INQUEST_` prefix, `__` section separator)
/// 3. Workspace-local config (`.inquest/config.toml`)
/// 4. User config (platform config dir)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&InquestConfig>,
) -> Result<InquestConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(InquestConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // INQUEST_LLM__MODEL, INQUEST_RESEARCH__CONCURRENCY, ...
    figment = figment.merge(Env::prefixed("INQUEST_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Path of the user-level config file, if a platform config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "inquest", "inquest")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".inquest").join("config.toml")
}

/// Directory for run records and logs.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "inquest", "inquest")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".inquest"))
}

/// Write `config` to the workspace config file, creating `.inquest/` if needed.
///
/// Refuses to overwrite an existing file. Returns the path written.
pub fn write_workspace_config(
    workspace: &Path,
    config: &InquestConfig,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("{} already exists", path.display()),
        });
    }
    let body = toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("cannot create {}: {}", parent.display(), e),
        })?;
    }
    std::fs::write(&path, body).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {}", path.display(), e),
    })?;
    Ok(path)
}
