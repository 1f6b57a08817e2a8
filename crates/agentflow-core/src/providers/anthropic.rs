// ABOUTME: Anthropic Claude API adapter implementing the LlmClient trait.
// ABOUTME: Translates ChatRequest into Messages API calls and parses text and tool_use blocks.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::message::{ChatMessage, Role, ToolCall};
use crate::providers::{env_or, read_json_response};
use crate::runtime::{ChatRequest, ChatResponse, FinishReason, LlmClient, LlmError, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude client adapter. Calls the Messages API with tool
/// definitions and maps tool_use blocks back to ToolCalls.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    /// Create a new AnthropicClient reading configuration from environment variables.
    /// Required: `ANTHROPIC_API_KEY`
    /// Optional: `ANTHROPIC_BASE_URL` (defaults to https://api.anthropic.com)
    /// Optional: `ANTHROPIC_MODEL` (defaults to claude-sonnet-4-5-20250929)
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| LlmError::ProviderError("ANTHROPIC_API_KEY not set".to_string()))?;

        let base_url = env_or("ANTHROPIC_BASE_URL", DEFAULT_BASE_URL);
        let model = env_or("ANTHROPIC_MODEL", DEFAULT_MODEL);

        Ok(Self::new(api_key, base_url, model))
    }

    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn default_model() -> &'static str {
        DEFAULT_MODEL
    }

    /// Build the JSON request body for the Anthropic Messages API.
    pub fn build_request_body(&self, request: &ChatRequest) -> Value {
        let mut system = request.system_prompt().unwrap_or_default();

        // The Messages API has no native schema mode, so the schema rides
        // along in the system prompt.
        if let Some(format) = &request.response_format {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(&format!(
                "Respond with a single JSON object named {} that matches this JSON schema, \
                 and nothing else:\n{}",
                format.name, format.schema
            ));
        }

        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(anthropic_message)
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": coalesce_messages(messages),
        });

        if !system.is_empty() {
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        body
    }

    /// Parse an Anthropic Messages API response into a ChatResponse.
    pub fn parse_response(response_body: &Value) -> Result<ChatResponse, LlmError> {
        let content = response_body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing content array in response".to_string())
            })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text.push_str(t);
                    }
                }
                Some("tool_use") => tool_calls.push(parse_tool_use(block)?),
                _ => {}
            }
        }

        let finish_reason = match response_body.get("stop_reason").and_then(|s| s.as_str()) {
            Some("end_turn") | Some("stop_sequence") | None => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("tool_use") => FinishReason::ToolCalls,
            Some("refusal") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Other(other.to_string()),
        };

        let usage = response_body
            .get("usage")
            .map(|u| Usage {
                input_tokens: u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                output_tokens: u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            })
            .unwrap_or_default();

        let mut message = ChatMessage::assistant(text);
        message.tool_calls = tool_calls;

        Ok(ChatResponse {
            message,
            finish_reason,
            usage,
        })
    }
}

/// Convert one non-system ChatMessage into Anthropic content blocks.
fn anthropic_message(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                "content": msg.content
            }]
        }),
        Role::Assistant => {
            let mut blocks = Vec::new();
            if !msg.content.is_empty() {
                blocks.push(json!({"type": "text", "text": msg.content}));
            }
            for call in &msg.tool_calls {
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.arguments
                }));
            }
            json!({"role": "assistant", "content": blocks})
        }
        _ => {
            let mut blocks = Vec::new();
            for image in &msg.images {
                blocks.push(json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": image.mime_type,
                        "data": image.data_base64
                    }
                }));
            }
            blocks.push(json!({"type": "text", "text": msg.content}));
            json!({"role": "user", "content": blocks})
        }
    }
}

/// Parse a single tool_use block.
fn parse_tool_use(block: &Value) -> Result<ToolCall, LlmError> {
    let name = block
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| LlmError::InvalidResponse("tool_use block missing name".to_string()))?;

    let id = block
        .get("id")
        .and_then(|i| i.as_str())
        .unwrap_or(name)
        .to_string();

    Ok(ToolCall {
        id,
        name: name.to_string(),
        arguments: block.get("input").cloned().unwrap_or(json!({})),
    })
}

/// Merge consecutive same-role messages; the Messages API requires
/// alternating user/assistant turns.
fn coalesce_messages(messages: Vec<Value>) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();

    for msg in messages {
        let role = msg.get("role").and_then(|r| r.as_str()).unwrap_or("user");
        let blocks = msg
            .get("content")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();

        if let Some(last) = result.last_mut()
            && last.get("role").and_then(|r| r.as_str()) == Some(role)
            && let Some(existing) = last.get_mut("content").and_then(|c| c.as_array_mut())
        {
            existing.extend(blocks);
            continue;
        }

        result.push(json!({"role": role, "content": blocks}));
    }

    result
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = self.build_request_body(request);
        let url = format!("{}/v1/messages", self.base_url);

        tracing::debug!(model = %self.model, messages = request.messages.len(), "anthropic request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderError(format!("HTTP request failed: {}", e)))?;

        let response_body = read_json_response(response, "ANTHROPIC_API_KEY").await?;
        Self::parse_response(&response_body)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
