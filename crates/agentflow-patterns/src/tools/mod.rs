// ABOUTME: Built-in tools used by the routing pattern and the crew examples.
// ABOUTME: Temperature lookup (Open-Meteo), a JSON knowledge base on disk, and Serper web search.

pub mod knowledge_base;
pub mod serper;
pub mod temperature;

pub use knowledge_base::KnowledgeBaseTool;
pub use serper::SerperSearchTool;
pub use temperature::TemperatureTool;

use agentflow_core::ToolError;

/// Map a reqwest failure onto a tool execution error.
pub(crate) fn http_error(context: &str, err: reqwest::Error) -> ToolError {
    ToolError::Execution(format!("{}: {}", context, err))
}
