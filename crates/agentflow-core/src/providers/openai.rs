// ABOUTME: OpenAI API adapter implementing the LlmClient trait.
// ABOUTME: Translates ChatRequest into Chat Completions calls with function calling, images and json_schema output.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::message::{ChatMessage, Role, ToolCall};
use crate::providers::{env_or, read_json_response};
use crate::runtime::{ChatRequest, ChatResponse, FinishReason, LlmClient, LlmError, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4.1";

/// OpenAI client adapter. Also works against any OpenAI-compatible endpoint
/// by pointing the base URL elsewhere.
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIClient {
    /// Create a new OpenAIClient reading configuration from environment variables.
    /// Required: `OPENAI_API_KEY`
    /// Optional: `OPENAI_BASE_URL` (defaults to https://api.openai.com)
    /// Optional: `OPENAI_MODEL` (defaults to gpt-4.1)
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::ProviderError("OPENAI_API_KEY not set".to_string()))?;

        let base_url = env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL);
        let model = env_or("OPENAI_MODEL", DEFAULT_MODEL);

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

    /// Endpoint for chat completions. Base URLs that already carry a
    /// version path (such as Gemini's `/v1beta/openai`) are used as is.
    fn completions_url(&self) -> String {
        let last = self.base_url.rsplit('/').next().unwrap_or("");
        if last.starts_with("v1") || last == "openai" {
            format!("{}/chat/completions", self.base_url)
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    /// Build the JSON request body for the Chat Completions API.
    pub fn build_request_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(openai_message).collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        if let Some(format) = &request.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.name,
                    "schema": format.schema,
                    "strict": true
                }
            });
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        body
    }

    /// Parse a Chat Completions response into a ChatResponse.
    pub fn parse_response(response_body: &Value) -> Result<ChatResponse, LlmError> {
        let choice = response_body
            .get("choices")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing choices array in response".to_string())
            })?
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("empty choices array".to_string()))?;

        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::InvalidResponse("missing message in choice".to_string()))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                tool_calls.push(parse_openai_tool_call(call)?);
            }
        }

        let finish_reason = match choice.get("finish_reason").and_then(|f| f.as_str()) {
            Some("stop") | None => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Other(other.to_string()),
        };

        let usage = response_body
            .get("usage")
            .map(|u| Usage {
                input_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
                output_tokens: u
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
            })
            .unwrap_or_default();

        let mut message = ChatMessage::assistant(content);
        message.tool_calls = tool_calls;

        Ok(ChatResponse {
            message,
            finish_reason,
            usage,
        })
    }
}

/// Convert one ChatMessage into an OpenAI message object.
fn openai_message(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content
        }),
        Role::Assistant if msg.has_tool_calls() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string()
                        }
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                json!(msg.content)
            };
            json!({
                "role": "assistant",
                "content": content,
                "tool_calls": calls
            })
        }
        _ if !msg.images.is_empty() => {
            let mut parts = vec![json!({"type": "text", "text": msg.content})];
            for image in &msg.images {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {"url": image.data_url()}
                }));
            }
            json!({
                "role": msg.role.as_str(),
                "content": parts
            })
        }
        _ => json!({
            "role": msg.role.as_str(),
            "content": msg.content
        }),
    }
}

/// Parse a single tool_call from the OpenAI response.
fn parse_openai_tool_call(tool_call: &Value) -> Result<ToolCall, LlmError> {
    let function = tool_call
        .get("function")
        .ok_or_else(|| LlmError::InvalidResponse("tool_call missing function".to_string()))?;

    let name = function
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| LlmError::InvalidResponse("function missing name".to_string()))?;

    let arguments_str = function
        .get("arguments")
        .and_then(|a| a.as_str())
        .unwrap_or("{}");

    let arguments: Value = if arguments_str.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(arguments_str).map_err(|e| {
            LlmError::InvalidResponse(format!("failed to parse function arguments: {}", e))
        })?
    };

    let id = tool_call
        .get("id")
        .and_then(|i| i.as_str())
        .unwrap_or(name)
        .to_string();

    Ok(ToolCall {
        id,
        name: name.to_string(),
        arguments,
    })
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = self.build_request_body(request);
        let url = self.completions_url();

        tracing::debug!(model = %self.model, messages = request.messages.len(), "openai request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderError(format!("HTTP request failed: {}", e)))?;

        let response_body = read_json_response(response, "OPENAI_API_KEY").await?;
        Self::parse_response(&response_body)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ImagePart, ToolDefinition};
    use crate::runtime::ResponseFormat;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> OpenAIClient {
        OpenAIClient::new(
            "test-key".to_string(),
            base_url.to_string(),
            "gpt-4.1".to_string(),
        )
    }

    #[test]
    fn openai_client_creation() {
        let client = client("https://api.openai.com/");

        assert_eq!(client.provider_name(), "openai");
        assert_eq!(client.model_name(), "gpt-4.1");
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, "https://api.openai.com");
        assert_eq!(
            client.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn compatible_base_url_keeps_its_path() {
        let gemini = client("https://generativelanguage.googleapis.com/v1beta/openai/");
        assert_eq!(
            gemini.completions_url(),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn openai_builds_request_body_with_tools_and_schema() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user("What's the weather in Paris?"),
        ])
        .with_tools(vec![ToolDefinition {
            name: "fetch_temperature".to_string(),
            description: "Get the temperature".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }])
        .with_response_format(ResponseFormat {
            name: "Answer".to_string(),
            schema: json!({"type": "object"}),
        });

        let body = client("https://api.openai.com").build_request_body(&request);

        assert_eq!(body["model"], "gpt-4.1");
        assert_eq!(body["max_tokens"], 4096);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");

        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "fetch_temperature");
        assert_eq!(body["tool_choice"], "auto");

        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "Answer");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn openai_serializes_tool_turns_and_images() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("Describe this").with_image(ImagePart {
                mime_type: "image/jpeg".to_string(),
                data_base64: "AAAA".to_string(),
            }),
            ChatMessage::assistant_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "fetch_temperature".to_string(),
                arguments: json!({"lat": 1.0, "lon": 2.0}),
            }]),
            ChatMessage::tool_result("call_1", "{\"temperature\": 20}"),
        ]);

        let body = client("https://api.openai.com").build_request_body(&request);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages[0]["content"][1]["type"], "image_url");
        assert_eq!(
            messages[0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
        assert!(messages[1]["content"].is_null());
        assert_eq!(
            messages[1]["tool_calls"][0]["function"]["arguments"],
            "{\"lat\":1.0,\"lon\":2.0}"
        );
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn openai_parses_tool_call_response() {
        let response = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [
                            {
                                "id": "call_abc",
                                "type": "function",
                                "function": {
                                    "name": "fetch_temperature",
                                    "arguments": "{\"lat\": 48.85, \"lon\": 2.35}"
                                }
                            }
                        ]
                    },
                    "finish_reason": "tool_calls"
                }
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7}
        });

        let parsed = OpenAIClient::parse_response(&response).unwrap();
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(parsed.usage.input_tokens, 12);
        assert_eq!(parsed.usage.output_tokens, 7);
        assert!(parsed.has_tool_calls());

        let call = &parsed.message.tool_calls[0];
        assert_eq!(call.id, "call_abc");
        assert_eq!(call.name, "fetch_temperature");
        assert_eq!(call.arguments["lat"], 48.85);
    }

    #[test]
    fn openai_parses_text_response() {
        let response = json!({
            "choices": [
                {
                    "index": 0,
                    "message": {"role": "assistant", "content": "It is sunny in Paris."},
                    "finish_reason": "stop"
                }
            ]
        });

        let parsed = OpenAIClient::parse_response(&response).unwrap();
        assert_eq!(parsed.text(), "It is sunny in Paris.");
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert!(!parsed.has_tool_calls());
    }

    #[test]
    fn openai_rejects_malformed_arguments() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_bad",
                        "type": "function",
                        "function": {"name": "fetch_temperature", "arguments": "{not json"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });

        let err = OpenAIClient::parse_response(&response).unwrap_err();
        assert!(err.to_string().contains("failed to parse function arguments"));
    }

    #[test]
    fn openai_rejects_missing_choices() {
        let err = OpenAIClient::parse_response(&json!({"id": "x"})).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn openai_complete_posts_to_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "pong"},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server.uri())
            .complete(&ChatRequest::new(vec![ChatMessage::user("ping")]))
            .await
            .unwrap();
        assert_eq!(response.text(), "pong");
    }

    #[tokio::test]
    async fn openai_maps_http_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request body"))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);

        let first = client.complete(&request).await.unwrap_err();
        assert!(matches!(first, LlmError::RateLimited));

        let second = client.complete(&request).await.unwrap_err();
        assert!(second.to_string().contains("check OPENAI_API_KEY"));

        let third = client.complete(&request).await.unwrap_err();
        assert!(third.to_string().contains("Server error"));

        let fourth = client.complete(&request).await.unwrap_err();
        assert!(fourth.to_string().contains("bad request body"));
    }

    #[tokio::test]
    #[cfg(feature = "live-test")]
    async fn openai_adapter_basic() {
        let client = OpenAIClient::from_env().expect("OPENAI_API_KEY must be set");
        let result = client
            .complete(&ChatRequest::new(vec![ChatMessage::user("Say hello.")]))
            .await;
        assert!(result.is_ok(), "live test failed: {:?}", result.err());
    }
}
