// ABOUTME: Defines the LlmClient trait that all LLM provider adapters must implement.
// ABOUTME: Also defines ChatRequest (what callers send), ChatResponse (what comes back) and LlmError.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ChatMessage, ToolDefinition};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Request for JSON output that conforms to a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
}

/// One round trip to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub response_format: Option<ResponseFormat>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            response_format: None,
            temperature: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// The system prompts of the request joined by blank lines, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == crate::message::Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The assistant turn produced by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl ChatResponse {
    pub fn text(&self) -> &str {
        &self.message.content
    }

    pub fn has_tool_calls(&self) -> bool {
        self.message.has_tool_calls()
    }
}

/// Errors that can occur while talking to a model.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Context too large")]
    ContextTooLarge,

    #[error("Structured output error: {0}")]
    Structured(String),
}

/// Trait that all LLM provider adapters must implement. Each provider
/// (OpenAI, Anthropic, Gemini) translates a ChatRequest into its own wire
/// format and maps the reply back into a ChatResponse.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Provider name for logging and display (e.g. "anthropic", "openai").
    fn provider_name(&self) -> &str;

    /// Model identifier being used (e.g. "gpt-4.1").
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_defaults() {
        let req = ChatRequest::new(vec![ChatMessage::user("hi")]);
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(req.tools.is_empty());
        assert!(req.response_format.is_none());
        assert!(req.temperature.is_none());
    }

    #[test]
    fn system_prompt_joins_system_messages() {
        let req = ChatRequest::new(vec![
            ChatMessage::system("first"),
            ChatMessage::user("question"),
            ChatMessage::system("second"),
        ]);
        assert_eq!(req.system_prompt().as_deref(), Some("first\n\nsecond"));

        let bare = ChatRequest::new(vec![ChatMessage::user("question")]);
        assert!(bare.system_prompt().is_none());
    }

    #[test]
    fn llm_error_display() {
        let errors = vec![
            LlmError::ProviderError("connection timeout".to_string()),
            LlmError::InvalidResponse("missing choices".to_string()),
            LlmError::RateLimited,
            LlmError::ContextTooLarge,
            LlmError::Structured("missing field `topic`".to_string()),
        ];

        for err in &errors {
            assert!(!err.to_string().is_empty());
        }

        assert!(
            LlmError::ProviderError("test".to_string())
                .to_string()
                .contains("test")
        );
    }
}
