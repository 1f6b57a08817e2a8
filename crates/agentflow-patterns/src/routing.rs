// ABOUTME: Agentic router: the model picks a tool (deducing its arguments), the router runs it, then asks for the answer.
// ABOUTME: Only the first requested tool call is executed; unknown tools are reported back as text.

use std::sync::Arc;

use serde_json::Value;

use agentflow_core::tools::result_text;
use agentflow_core::{ChatMessage, ChatRequest, LlmClient, ToolError, ToolRegistry};

use crate::error::PatternError;
use crate::tools::{KnowledgeBaseTool, TemperatureTool};

const ROUTER_PROMPT: &str = "You are a helpful assistant with access to tools. \
For the 'fetch_temperature' tool, if the user provides a location name but not coordinates, \
use your general knowledge to determine the latitude and longitude, then call the function \
with those deduced values. If you are unsure or the location is ambiguous, ask the user for clarification.";

#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    pub tool_used: Option<String>,
    pub arguments: Option<Value>,
    pub answer: String,
}

pub struct AgenticRouter {
    client: Arc<dyn LlmClient>,
    registry: ToolRegistry,
}

impl AgenticRouter {
    pub fn new(client: Arc<dyn LlmClient>, registry: ToolRegistry) -> Self {
        Self { client, registry }
    }

    /// Router wired with the temperature and knowledge-base tools.
    pub fn with_default_tools(client: Arc<dyn LlmClient>, kb_path: &std::path::Path) -> Self {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(TemperatureTool::new()))
            .with_tool(Arc::new(KnowledgeBaseTool::new(kb_path)));
        Self::new(client, registry)
    }

    pub async fn route(&self, query: &str) -> Result<RouteOutcome, PatternError> {
        tracing::info!(query, "routing user query");

        let mut messages = vec![ChatMessage::system(ROUTER_PROMPT), ChatMessage::user(query)];

        let first = self
            .client
            .complete(&ChatRequest::new(messages.clone()).with_tools(self.registry.definitions()))
            .await?;

        let Some(call) = first.message.tool_calls.first().cloned() else {
            tracing::info!("model answered without a tool");
            return Ok(RouteOutcome {
                tool_used: None,
                arguments: None,
                answer: first.message.content,
            });
        };

        tracing::info!(tool = %call.name, arguments = %call.arguments, "model chose a tool");

        // Only the first call is answered; drop the rest so the transcript
        // stays consistent for the follow-up request.
        let mut assistant = first.message;
        assistant.tool_calls.truncate(1);
        messages.push(assistant);

        let output = match self.registry.dispatch(&call.name, call.arguments.clone()).await {
            Ok(value) => result_text(&value),
            Err(ToolError::NotFound(name)) => format!("Error: function {} not found", name),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                format!("Error: {}", e)
            }
        };
        messages.push(ChatMessage::tool_result(call.id.clone(), output));

        let second = self.client.complete(&ChatRequest::new(messages)).await?;
        tracing::info!("final response generated");

        Ok(RouteOutcome {
            tool_used: Some(call.name),
            arguments: Some(call.arguments),
            answer: second.message.content,
        })
    }
}
