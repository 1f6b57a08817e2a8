// ABOUTME: Shared LLM plumbing for agentflow: messages, client trait, provider adapters, tools.
// ABOUTME: Every orchestration pattern and the MCP agent build on the types re-exported here.

pub mod agent_loop;
pub mod client;
pub mod config;
pub mod message;
pub mod providers;
pub mod runtime;
pub mod structured;
pub mod testing;
pub mod tools;

pub use agent_loop::{ToolLoopOutcome, run_tool_loop};
pub use client::create_llm_client;
pub use config::{ConfigError, FlowConfig};
pub use message::{ChatMessage, ImagePart, Role, ToolCall, ToolDefinition};
pub use runtime::{
    ChatRequest, ChatResponse, FinishReason, LlmClient, LlmError, ResponseFormat, Usage,
};
pub use structured::{StructuredOutput, complete_structured, parse_structured, response_format};
pub use tools::{Tool, ToolError, ToolRegistry};
