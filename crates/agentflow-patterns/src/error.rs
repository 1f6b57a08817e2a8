// ABOUTME: Error type shared by the orchestration patterns.
// ABOUTME: Wraps model and tool failures and flags invalid pattern settings.

use agentflow_core::{LlmError, ToolError};

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}
