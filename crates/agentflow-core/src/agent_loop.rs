// ABOUTME: Bounded tool-calling loop: call the model, run requested tools, feed results back, repeat.
// ABOUTME: Ends at the first reply without tool calls, or errors once the step budget is spent.

use crate::message::ChatMessage;
use crate::runtime::{ChatRequest, LlmClient, LlmError};
use crate::tools::{ToolRegistry, result_text};

#[derive(Debug, Clone)]
pub struct ToolLoopOutcome {
    pub final_text: String,
    /// Full transcript including the final assistant reply.
    pub messages: Vec<ChatMessage>,
    /// Tool names in the order they were invoked.
    pub tool_invocations: Vec<String>,
}

pub async fn run_tool_loop(
    client: &dyn LlmClient,
    mut messages: Vec<ChatMessage>,
    registry: &ToolRegistry,
    max_steps: usize,
) -> Result<ToolLoopOutcome, LlmError> {
    let definitions = registry.definitions();
    let mut tool_invocations = Vec::new();

    for step in 0..max_steps {
        let request = ChatRequest::new(messages.clone()).with_tools(definitions.clone());
        let response = client.complete(&request).await?;

        if !response.has_tool_calls() {
            let final_text = response.message.content.clone();
            messages.push(response.message);
            tracing::debug!(step, tools = tool_invocations.len(), "tool loop finished");
            return Ok(ToolLoopOutcome {
                final_text,
                messages,
                tool_invocations,
            });
        }

        let calls = response.message.tool_calls.clone();
        messages.push(response.message);

        for call in calls {
            tracing::info!(step, tool = %call.name, "model requested tool");
            tool_invocations.push(call.name.clone());

            let content = match registry.dispatch(&call.name, call.arguments.clone()).await {
                Ok(value) => result_text(&value),
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                    format!("Error: {}", e)
                }
            };
            messages.push(ChatMessage::tool_result(call.id, content));
        }
    }

    Err(LlmError::InvalidResponse(format!(
        "tool loop exceeded {} steps",
        max_steps
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::testing::ScriptedLlmClient;
    use crate::tools::{Tool, ToolError, required_f64};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct Multiply;

    #[async_trait]
    impl Tool for Multiply {
        fn name(&self) -> &str {
            "multiply"
        }
        fn description(&self) -> &str {
            "Multiply a by b"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn call(&self, args: Value) -> Result<Value, ToolError> {
            Ok(json!(required_f64(&args, "a")? * required_f64(&args, "b")?))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(Arc::new(Multiply))
    }

    #[tokio::test]
    async fn runs_tools_until_plain_reply() {
        let client = ScriptedLlmClient::new()
            .tool_call("c1", "multiply", json!({"a": 6, "b": 7}))
            .text("The answer is 42.");

        let outcome = run_tool_loop(&client, vec![ChatMessage::user("6*7?")], &registry(), 5)
            .await
            .unwrap();

        assert_eq!(outcome.final_text, "The answer is 42.");
        assert_eq!(outcome.tool_invocations, vec!["multiply"]);

        // user, assistant(tool call), tool result, final assistant
        assert_eq!(outcome.messages.len(), 4);
        assert_eq!(outcome.messages[2].role, Role::Tool);
        assert_eq!(outcome.messages[2].content, "42.0");

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back() {
        let client = ScriptedLlmClient::new()
            .tool_call("c1", "divide", json!({}))
            .text("I could not divide.");

        let outcome = run_tool_loop(&client, vec![ChatMessage::user("1/0")], &registry(), 5)
            .await
            .unwrap();

        assert_eq!(outcome.messages[2].content, "Error: tool not found: divide");
        assert_eq!(outcome.final_text, "I could not divide.");
    }

    #[tokio::test]
    async fn exceeding_step_budget_is_an_error() {
        let client = ScriptedLlmClient::new()
            .tool_call("c1", "multiply", json!({"a": 1, "b": 1}))
            .tool_call("c2", "multiply", json!({"a": 1, "b": 1}));

        let err = run_tool_loop(&client, vec![ChatMessage::user("loop")], &registry(), 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tool loop exceeded 2 steps"));
    }

    #[tokio::test]
    async fn no_tools_means_single_call() {
        let client = ScriptedLlmClient::new().text("hello");
        let outcome = run_tool_loop(&client, vec![ChatMessage::user("hi")], &ToolRegistry::new(), 3)
            .await
            .unwrap();
        assert_eq!(outcome.final_text, "hello");
        assert!(outcome.tool_invocations.is_empty());
        assert!(client.requests()[0].tools.is_empty());
    }
}
