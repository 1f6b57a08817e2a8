// ABOUTME: Factory function for creating LLM clients from a provider name.
// ABOUTME: Resolves provider name + optional model into a configured (Arc<dyn LlmClient>, model) pair.

use std::env;
use std::sync::Arc;

use crate::providers::anthropic::AnthropicClient;
use crate::providers::gemini::GeminiClient;
use crate::providers::openai::OpenAIClient;
use crate::runtime::LlmClient;

/// Provider names accepted by [`create_llm_client`].
pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "anthropic", "gemini"];

/// Read an env var and return `Some(value)` only if it is non-empty after trimming.
fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    })
}

/// Create an LLM client for the given provider name.
///
/// Returns a tuple of (client, resolved_model). The model is resolved from:
/// 1. The explicit `model` parameter (if Some)
/// 2. A provider-specific environment variable (e.g. OPENAI_MODEL)
/// 3. The provider's default model
pub fn create_llm_client(
    provider: &str,
    model: Option<&str>,
) -> Result<(Arc<dyn LlmClient>, String), anyhow::Error> {
    match provider {
        "openai" => {
            let api_key = non_empty_env("OPENAI_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
            let resolved_model = model
                .map(String::from)
                .or_else(|| non_empty_env("OPENAI_MODEL"))
                .unwrap_or_else(|| OpenAIClient::default_model().to_string());
            let base_url = non_empty_env("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string());
            let client = OpenAIClient::new(api_key, base_url, resolved_model.clone());
            Ok((Arc::new(client), resolved_model))
        }
        "anthropic" => {
            let api_key = non_empty_env("ANTHROPIC_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
            let resolved_model = model
                .map(String::from)
                .or_else(|| non_empty_env("ANTHROPIC_MODEL"))
                .unwrap_or_else(|| AnthropicClient::default_model().to_string());
            let base_url = non_empty_env("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| "https://api.anthropic.com".to_string());
            let client = AnthropicClient::new(api_key, base_url, resolved_model.clone());
            Ok((Arc::new(client), resolved_model))
        }
        "gemini" => {
            let api_key = non_empty_env("GEMINI_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;
            let resolved_model = model
                .map(String::from)
                .or_else(|| non_empty_env("GEMINI_MODEL"))
                .unwrap_or_else(|| GeminiClient::default_model().to_string());
            let base_url = non_empty_env("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());
            let client = GeminiClient::new(api_key, base_url, resolved_model.clone());
            Ok((Arc::new(client), resolved_model))
        }
        unknown => Err(anyhow::anyhow!("unsupported LLM provider: {}", unknown)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all tests that read/write env vars to prevent race conditions.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "ANTHROPIC_API_KEY",
        "ANTHROPIC_MODEL",
        "ANTHROPIC_BASE_URL",
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "OPENAI_BASE_URL",
        "GEMINI_API_KEY",
        "GEMINI_MODEL",
        "GEMINI_BASE_URL",
    ];

    fn save_env() -> Vec<(&'static str, Option<String>)> {
        ENV_VARS.iter().map(|&k| (k, env::var(k).ok())).collect()
    }

    fn restore_env(snapshot: &[(&str, Option<String>)]) {
        for &(key, ref val) in snapshot {
            match val {
                // SAFETY: guarded by ENV_MUTEX; no other test thread touches these vars concurrently.
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }
    }

    /// Uses match instead of unwrap_err() because Arc<dyn LlmClient> doesn't impl Debug.
    fn expect_err(result: Result<(Arc<dyn LlmClient>, String), anyhow::Error>) -> String {
        match result {
            Err(e) => e.to_string(),
            Ok((_client, model)) => panic!("expected error, got Ok with model: {}", model),
        }
    }

    fn expect_ok(result: Result<(Arc<dyn LlmClient>, String), anyhow::Error>) -> (Arc<dyn LlmClient>, String) {
        match result {
            Ok(pair) => pair,
            Err(e) => panic!("expected Ok, got Err: {}", e),
        }
    }

    #[test]
    fn unknown_provider_returns_error() {
        let err = expect_err(create_llm_client("mistral", None));
        assert!(
            err.contains("unsupported LLM provider"),
            "expected 'unsupported LLM provider' in error, got: {}",
            err
        );
    }

    #[test]
    fn missing_api_keys_name_the_variable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = save_env();
        unsafe {
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("ANTHROPIC_API_KEY");
            env::remove_var("GEMINI_API_KEY");
        }
        let openai = expect_err(create_llm_client("openai", None));
        let anthropic = expect_err(create_llm_client("anthropic", None));
        let gemini = expect_err(create_llm_client("gemini", None));
        restore_env(&saved);

        assert!(openai.contains("OPENAI_API_KEY"), "got: {}", openai);
        assert!(anthropic.contains("ANTHROPIC_API_KEY"), "got: {}", anthropic);
        assert!(gemini.contains("GEMINI_API_KEY"), "got: {}", gemini);
    }

    #[test]
    fn explicit_model_param_overrides_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = save_env();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-key");
            env::set_var("OPENAI_MODEL", "gpt-4o-mini");
        }

        let result = create_llm_client("openai", Some("gpt-4.1-nano"));
        restore_env(&saved);

        let (client, resolved_model) = expect_ok(result);
        assert_eq!(resolved_model, "gpt-4.1-nano");
        assert_eq!(client.model_name(), "gpt-4.1-nano");
    }

    #[test]
    fn env_model_overrides_default() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = save_env();
        unsafe {
            env::set_var("GEMINI_API_KEY", "test-key");
            env::set_var("GEMINI_MODEL", "gemini-2.5-pro");
        }

        let result = create_llm_client("gemini", None);
        restore_env(&saved);

        let (client, resolved_model) = expect_ok(result);
        assert_eq!(resolved_model, "gemini-2.5-pro");
        assert_eq!(client.provider_name(), "gemini");
    }

    #[test]
    fn defaults_per_provider() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = save_env();
        unsafe {
            env::set_var("OPENAI_API_KEY", "k");
            env::set_var("ANTHROPIC_API_KEY", "k");
            env::remove_var("OPENAI_MODEL");
            env::set_var("ANTHROPIC_MODEL", "   ");
        }

        let openai = create_llm_client("openai", None);
        let anthropic = create_llm_client("anthropic", None);
        restore_env(&saved);

        assert_eq!(expect_ok(openai).1, "gpt-4.1");
        assert_eq!(expect_ok(anthropic).1, "claude-sonnet-4-5-20250929");
    }
}
