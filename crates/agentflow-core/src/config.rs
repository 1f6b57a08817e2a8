// ABOUTME: Configuration loading and validation for agentflow runs.
// ABOUTME: Reads provider defaults, tool API keys, knowledge-base path and the tool step budget from the environment.

use std::path::PathBuf;

use thiserror::Error;

use crate::client::SUPPORTED_PROVIDERS;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_KB_PATH: &str = "retrieval_knowledgebase.json";
pub const DEFAULT_MAX_TOOL_STEPS: usize = 25;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("AGENTFLOW_DEFAULT_PROVIDER must be one of openai, anthropic, gemini; got '{0}'")]
    UnknownProvider(String),

    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    pub default_provider: String,
    pub default_model: Option<String>,
    pub openweather_api_key: Option<String>,
    pub serper_api_key: Option<String>,
    pub kb_path: PathBuf,
    pub max_tool_steps: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            default_model: None,
            openweather_api_key: None,
            serper_api_key: None,
            kb_path: PathBuf::from(DEFAULT_KB_PATH),
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
        }
    }
}

impl FlowConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - AGENTFLOW_DEFAULT_PROVIDER: openai | anthropic | gemini (default: openai)
    /// - AGENTFLOW_DEFAULT_MODEL: model override (optional)
    /// - OPENWEATHER_API_KEY: key for the weather server (optional)
    /// - SERPER_API_KEY: key for the web search tool (optional)
    /// - AGENTFLOW_KB_PATH: knowledge base JSON (default: retrieval_knowledgebase.json)
    /// - AGENTFLOW_MAX_TOOL_STEPS: tool loop budget (default: 25)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let default_provider = get("AGENTFLOW_DEFAULT_PROVIDER")
            .map(|p| p.to_lowercase())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        if !SUPPORTED_PROVIDERS.contains(&default_provider.as_str()) {
            return Err(ConfigError::UnknownProvider(default_provider));
        }

        let max_tool_steps = match get("AGENTFLOW_MAX_TOOL_STEPS") {
            None => DEFAULT_MAX_TOOL_STEPS,
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: "AGENTFLOW_MAX_TOOL_STEPS".to_string(),
                        value: raw,
                    });
                }
            },
        };

        Ok(Self {
            default_provider,
            default_model: get("AGENTFLOW_DEFAULT_MODEL"),
            openweather_api_key: get("OPENWEATHER_API_KEY"),
            serper_api_key: get("SERPER_API_KEY"),
            kb_path: get("AGENTFLOW_KB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KB_PATH)),
            max_tool_steps,
        })
    }
}
