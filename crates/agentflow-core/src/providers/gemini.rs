// ABOUTME: Google Gemini API adapter implementing the LlmClient trait.
// ABOUTME: Translates ChatRequest into generateContent calls with function declarations and inline images.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::message::{ChatMessage, Role, ToolCall};
use crate::providers::{env_or, read_json_response};
use crate::runtime::{ChatRequest, ChatResponse, FinishReason, LlmClient, LlmError, Usage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini client adapter. Calls generateContent with function declarations
/// and maps functionCall parts back to ToolCalls.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Create a new GeminiClient reading configuration from environment variables.
    /// Required: `GEMINI_API_KEY`
    /// Optional: `GEMINI_BASE_URL`, `GEMINI_MODEL` (defaults to gemini-2.0-flash)
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LlmError::ProviderError("GEMINI_API_KEY not set".to_string()))?;

        let base_url = env_or("GEMINI_BASE_URL", DEFAULT_BASE_URL);
        let model = env_or("GEMINI_MODEL", DEFAULT_MODEL);

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

    /// Build the JSON request body for the generateContent API.
    pub fn build_request_body(&self, request: &ChatRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| gemini_content(m, &request.messages))
            .collect();

        let mut generation_config = json!({
            "max_output_tokens": request.max_tokens
        });
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(format) = &request.response_format {
            generation_config["response_mime_type"] = json!("application/json");
            generation_config["response_schema"] = gemini_schema(&format.schema);
        }

        let mut body = json!({
            "contents": coalesce_gemini_contents(contents),
            "generation_config": generation_config,
        });

        if let Some(system) = request.system_prompt() {
            body["system_instruction"] = json!({"parts": [{"text": system}]});
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": gemini_schema(&tool.parameters)
                    })
                })
                .collect();
            body["tools"] = json!([{"function_declarations": declarations}]);
        }

        body
    }

    /// Parse a generateContent response into a ChatResponse.
    pub fn parse_response(response_body: &Value) -> Result<ChatResponse, LlmError> {
        let candidate = response_body
            .get("candidates")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing candidates array in response".to_string())
            })?
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("empty candidates array".to_string()))?;

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in &parts {
            if let Some(function_call) = part.get("functionCall") {
                let name = function_call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| {
                        LlmError::InvalidResponse("functionCall missing name".to_string())
                    })?;
                // Gemini has no call ids; the name answers the call.
                tool_calls.push(ToolCall {
                    id: name.to_string(),
                    name: name.to_string(),
                    arguments: function_call.get("args").cloned().unwrap_or(json!({})),
                });
            } else if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
                text.push_str(t);
            }
        }

        let finish_reason = if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else {
            match candidate.get("finishReason").and_then(|f| f.as_str()) {
                Some("STOP") | None => FinishReason::Stop,
                Some("MAX_TOKENS") => FinishReason::Length,
                Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
                Some(other) => FinishReason::Other(other.to_string()),
            }
        };

        if parts.is_empty() && finish_reason != FinishReason::Stop {
            return Err(LlmError::InvalidResponse(format!(
                "no content in response (finish reason {:?})",
                finish_reason
            )));
        }

        let usage = response_body
            .get("usageMetadata")
            .map(|u| Usage {
                input_tokens: u
                    .get("promptTokenCount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
                output_tokens: u
                    .get("candidatesTokenCount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
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

/// Convert one non-system ChatMessage into a Gemini content object.
/// Tool results need the function name, which is looked up from the
/// assistant call that produced them.
fn gemini_content(msg: &ChatMessage, history: &[ChatMessage]) -> Value {
    match msg.role {
        Role::Tool => {
            let call_id = msg.tool_call_id.clone().unwrap_or_default();
            let name = history
                .iter()
                .flat_map(|m| m.tool_calls.iter())
                .find(|c| c.id == call_id)
                .map(|c| c.name.clone())
                .unwrap_or(call_id);
            let response: Value = serde_json::from_str(&msg.content)
                .ok()
                .filter(|v: &Value| v.is_object())
                .unwrap_or_else(|| json!({"result": msg.content}));
            json!({
                "role": "user",
                "parts": [{"functionResponse": {"name": name, "response": response}}]
            })
        }
        Role::Assistant => {
            let mut parts = Vec::new();
            if !msg.content.is_empty() {
                parts.push(json!({"text": msg.content}));
            }
            for call in &msg.tool_calls {
                parts.push(json!({"functionCall": {"name": call.name, "args": call.arguments}}));
            }
            json!({"role": "model", "parts": parts})
        }
        _ => {
            let mut parts = vec![json!({"text": msg.content})];
            for image in &msg.images {
                parts.push(json!({
                    "inline_data": {
                        "mime_type": image.mime_type,
                        "data": image.data_base64
                    }
                }));
            }
            json!({"role": "user", "parts": parts})
        }
    }
}

/// Gemini's schema dialect rejects `additionalProperties`; strip it recursively.
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "additionalProperties")
                .map(|(k, v)| (k.clone(), gemini_schema(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

/// Coalesce consecutive Gemini contents with the same role.
fn coalesce_gemini_contents(contents: Vec<Value>) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();

    for content in contents {
        let role = content
            .get("role")
            .and_then(|r| r.as_str())
            .unwrap_or("user");
        let parts = content
            .get("parts")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        if let Some(last) = result.last_mut()
            && last.get("role").and_then(|r| r.as_str()) == Some(role)
            && let Some(existing) = last.get_mut("parts").and_then(|p| p.as_array_mut())
        {
            existing.extend(parts);
            continue;
        }

        result.push(json!({"role": role, "parts": parts}));
    }

    result
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = self.build_request_body(request);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        tracing::debug!(model = %self.model, messages = request.messages.len(), "gemini request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderError(format!("HTTP request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::ProviderError(
                "Unauthorized: check GEMINI_API_KEY".to_string(),
            ));
        }

        let response_body = read_json_response(response, "GEMINI_API_KEY").await?;
        Self::parse_response(&response_body)
    }

    fn provider_name(&self) -> &str {
        "gemini"
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
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> GeminiClient {
        GeminiClient::new(
            "test-key".to_string(),
            base_url.to_string(),
            "gemini-2.0-flash".to_string(),
        )
    }

    #[test]
    fn gemini_client_creation() {
        let client = client("https://generativelanguage.googleapis.com");
        assert_eq!(client.provider_name(), "gemini");
        assert_eq!(client.model_name(), "gemini-2.0-flash");
    }

    #[test]
    fn gemini_builds_request_body() {
        let request = ChatRequest::new(vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("What is in this picture?").with_image(ImagePart {
                mime_type: "image/jpeg".to_string(),
                data_base64: "AAAA".to_string(),
            }),
        ])
        .with_tools(vec![ToolDefinition {
            name: "get_weather".to_string(),
            description: "Weather lookup".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "additionalProperties": false
            }),
        }])
        .with_response_format(ResponseFormat {
            name: "Answer".to_string(),
            schema: json!({"type": "object", "additionalProperties": false}),
        });

        let body = client("https://example.test").build_request_body(&request);

        assert_eq!(body["system_instruction"]["parts"][0]["text"], "Be brief.");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["parts"][1]["inline_data"]["mime_type"], "image/jpeg");

        let decl = &body["tools"][0]["function_declarations"][0];
        assert_eq!(decl["name"], "get_weather");
        assert!(decl["parameters"].get("additionalProperties").is_none());

        assert_eq!(
            body["generation_config"]["response_mime_type"],
            "application/json"
        );
        assert_eq!(body["generation_config"]["max_output_tokens"], 4096);
    }

    #[test]
    fn gemini_function_response_uses_call_name() {
        let request = ChatRequest::new(vec![
            ChatMessage::user("Weather?"),
            ChatMessage::assistant_tool_calls(vec![ToolCall {
                id: "get_weather".to_string(),
                name: "get_weather".to_string(),
                arguments: json!({"location": "Paris"}),
            }]),
            ChatMessage::tool_result("get_weather", "{\"temperature_celsius\": 18}"),
            ChatMessage::tool_result("get_weather", "plain text"),
        ]);

        let body = client("https://example.test").build_request_body(&request);
        let contents = body["contents"].as_array().unwrap();

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "get_weather");

        let responses = contents[2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0]["functionResponse"]["response"]["temperature_celsius"],
            18
        );
        assert_eq!(
            responses[1]["functionResponse"]["response"]["result"],
            "plain text"
        );
    }

    #[test]
    fn coalesce_gemini_merges_consecutive_same_role() {
        let contents = vec![
            json!({"role": "user", "parts": [{"text": "first"}]}),
            json!({"role": "user", "parts": [{"text": "second"}]}),
            json!({"role": "model", "parts": [{"text": "reply"}]}),
        ];

        let merged = coalesce_gemini_contents(contents);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(merged[1]["role"], "model");
    }

    #[test]
    fn gemini_parses_function_call_response() {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"functionCall": {"name": "get_weather", "args": {"location": "Oslo"}}}]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 3}
        });

        let parsed = GeminiClient::parse_response(&response).unwrap();
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(parsed.usage.output_tokens, 3);
        assert_eq!(parsed.message.tool_calls[0].name, "get_weather");
        assert_eq!(parsed.message.tool_calls[0].arguments["location"], "Oslo");
    }

    #[test]
    fn gemini_parses_text_response() {
        let response = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Bonjour"}]},
                "finishReason": "STOP"
            }]
        });

        let parsed = GeminiClient::parse_response(&response).unwrap();
        assert_eq!(parsed.text(), "Bonjour");
    }

    #[test]
    fn gemini_rejects_blocked_empty_candidate() {
        let response = json!({
            "candidates": [{"finishReason": "SAFETY"}]
        });

        let err = GeminiClient::parse_response(&response).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn gemini_complete_uses_key_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "hi"}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server.uri())
            .complete(&ChatRequest::new(vec![ChatMessage::user("hello")]))
            .await
            .unwrap();
        assert_eq!(response.text(), "hi");
    }

    #[tokio::test]
    async fn gemini_forbidden_names_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .complete(&ChatRequest::new(vec![ChatMessage::user("hello")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    #[cfg(feature = "live-test")]
    async fn gemini_adapter_basic() {
        let client = GeminiClient::from_env().expect("GEMINI_API_KEY must be set");
        let result = client
            .complete(&ChatRequest::new(vec![ChatMessage::user("Say hello.")]))
            .await;
        assert!(result.is_ok(), "live test failed: {:?}", result.err());
    }
}
