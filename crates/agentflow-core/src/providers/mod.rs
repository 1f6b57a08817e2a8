// ABOUTME: Provider module aggregating all LLM client adapters.
// ABOUTME: Each sub-module implements LlmClient for a specific hosted API; the HTTP status mapping is shared.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde_json::Value;

use crate::runtime::LlmError;

/// Map a provider HTTP response onto LlmError by status, then decode the
/// JSON body. `key_var` names the env var to mention when auth fails.
pub(crate) async fn read_json_response(
    response: reqwest::Response,
    key_var: &str,
) -> Result<Value, LlmError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(LlmError::ProviderError(format!(
            "Unauthorized: check {}",
            key_var
        )));
    }

    if status.is_server_error() {
        return Err(LlmError::ProviderError(format!("Server error: {}", status)));
    }

    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        if error_body.contains("context_length_exceeded") {
            return Err(LlmError::ContextTooLarge);
        }
        return Err(LlmError::ProviderError(format!(
            "API error {}: {}",
            status, error_body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::InvalidResponse(format!("failed to parse JSON: {}", e)))
}

/// Read a provider setting from the environment, falling back to a default.
pub(crate) fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
