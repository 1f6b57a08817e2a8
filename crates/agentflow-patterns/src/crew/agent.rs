// ABOUTME: Crew agent: a persona (role, goal, backstory) with optional tools and its own model.
// ABOUTME: Agents are configuration only; the crew runner drives them.

use std::sync::Arc;

use agentflow_core::config::DEFAULT_MAX_TOOL_STEPS;
use agentflow_core::{LlmClient, Tool, ToolRegistry};

#[derive(Clone)]
pub struct Agent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: ToolRegistry,
    pub llm: Option<Arc<dyn LlmClient>>,
    /// Step budget for the tool-calling loop.
    pub max_iterations: usize,
}

impl Agent {
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
            tools: ToolRegistry::new(),
            llm: None,
            max_iterations: DEFAULT_MAX_TOOL_STEPS,
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("tools", &self.tools)
            .field("llm", &self.llm.as_ref().map(|l| l.model_name().to_string()))
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
