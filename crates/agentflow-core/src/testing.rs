// ABOUTME: Test utilities for agentflow, including a scripted LLM client.
// ABOUTME: Used in tests across the workspace to simulate model replies without real API calls.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::message::{ChatMessage, ToolCall};
use crate::runtime::{ChatRequest, ChatResponse, FinishReason, LlmClient, LlmError, Usage};

/// A client that replays queued responses in order and records every
/// request it receives.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<ChatResponse, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply.
    pub fn text(self, text: &str) -> Self {
        self.push(Ok(ChatResponse {
            message: ChatMessage::assistant(text),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }))
    }

    /// Queue a reply whose text is the given JSON value.
    pub fn json(self, value: Value) -> Self {
        self.text(&value.to_string())
    }

    /// Queue a reply that requests a single tool call.
    pub fn tool_call(self, id: &str, name: &str, arguments: Value) -> Self {
        self.tool_calls(vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }])
    }

    /// Queue a reply that requests several tool calls at once.
    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(ChatResponse {
            message: ChatMessage::assistant_tool_calls(calls),
            finish_reason: FinishReason::ToolCalls,
            usage: Usage::default(),
        }))
    }

    /// Queue a provider failure.
    pub fn error(self, message: &str) -> Self {
        self.push(Err(message.to_string()))
    }

    fn push(self, response: Result<ChatResponse, String>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of queued replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| LlmError::ProviderError("script lock poisoned".to_string()))?
            .pop_front();

        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(LlmError::ProviderError(message)),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replays_in_order_and_records_requests() {
        let client = ScriptedLlmClient::new()
            .text("first")
            .tool_call("call_1", "get_weather", json!({"location": "Rome"}));

        let req = ChatRequest::new(vec![ChatMessage::user("hello")]);
        let a = client.complete(&req).await.unwrap();
        let b = client.complete(&req).await.unwrap();

        assert_eq!(a.text(), "first");
        assert!(b.has_tool_calls());
        assert_eq!(b.finish_reason, FinishReason::ToolCalls);
        assert_eq!(client.requests().len(), 2);
        assert_eq!(client.remaining(), 0);
    }

    #[tokio::test]
    async fn exhausted_script_is_an_error() {
        let client = ScriptedLlmClient::new();
        let err = client
            .complete(&ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
    }

    #[tokio::test]
    async fn queued_error_surfaces_as_provider_error() {
        let client = ScriptedLlmClient::new().error("boom");
        let err = client
            .complete(&ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ProviderError(ref m) if m == "boom"));
    }
}
