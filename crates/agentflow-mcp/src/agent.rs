// ABOUTME: Chat agent over a tool registry (usually MCP-backed) with per-thread conversation memory.
// ABOUTME: Each invoke appends the user turn, runs the tool loop, and stores the resulting transcript.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use agentflow_core::config::DEFAULT_MAX_TOOL_STEPS;
use agentflow_core::{ChatMessage, LlmClient, LlmError, ToolRegistry, run_tool_loop};

pub const WEATHER_AGENT_PROMPT: &str =
    "You're a helpful assistant that uses tools to get the current weather for a location.";

pub const MULTI_SERVER_AGENT_PROMPT: &str = "You're a helpful assistant. You have access to tools for \
checking the weather and managing a to-do list. Use the tools when necessary based on the user's request.";

pub struct ChatAgent {
    client: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    system_prompt: String,
    max_steps: usize,
    threads: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl ChatAgent {
    pub fn new(client: Arc<dyn LlmClient>, tools: ToolRegistry, system_prompt: &str) -> Self {
        Self {
            client,
            tools,
            system_prompt: system_prompt.to_string(),
            max_steps: DEFAULT_MAX_TOOL_STEPS,
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Send one user message on `thread_id` and return the final reply.
    pub async fn invoke(&self, thread_id: &str, message: &str) -> Result<String, LlmError> {
        let mut history = self
            .threads
            .lock()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        history.push(ChatMessage::user(message));

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(history);

        let outcome = run_tool_loop(self.client.as_ref(), messages, &self.tools, self.max_steps).await?;
        if !outcome.tool_invocations.is_empty() {
            tracing::info!(thread = thread_id, tools = ?outcome.tool_invocations, "agent used tools");
        }

        // The system prompt is re-added on every turn, so it is not stored.
        let transcript = outcome.messages.into_iter().skip(1).collect();
        self.threads.lock().await.insert(thread_id.to_string(), transcript);

        Ok(outcome.final_text)
    }

    /// Stored transcript for a thread, without the system prompt.
    pub async fn history(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.threads
            .lock()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }
}
