// ABOUTME: MCP server: exposes tools, prompt templates and resources, dispatching JSON-RPC messages.
// ABOUTME: Transport-agnostic; stdio and HTTP front-ends both call handle_message.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use agentflow_core::tools::result_text;
use agentflow_core::{Tool, ToolRegistry};

use crate::protocol::*;

type Renderer = Arc<dyn Fn(&HashMap<String, String>) -> String + Send + Sync>;

/// A named prompt whose text is produced from string arguments.
#[derive(Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    render: Renderer,
}

impl PromptTemplate {
    pub fn new<F>(name: &str, description: &str, render: F) -> Self
    where
        F: Fn(&HashMap<String, String>) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            arguments: Vec::new(),
            render: Arc::new(render),
        }
    }

    /// Declare a required argument.
    pub fn with_argument(mut self, name: &str, description: &str) -> Self {
        self.arguments.push(PromptArgument {
            name: name.to_string(),
            description: Some(description.to_string()),
            required: true,
        });
        self
    }

    pub fn info(&self) -> PromptInfo {
        PromptInfo {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            arguments: self.arguments.clone(),
        }
    }

    pub fn render(&self, arguments: &HashMap<String, String>) -> Result<String, String> {
        if let Some(missing) = self
            .arguments
            .iter()
            .find(|a| a.required && !arguments.contains_key(&a.name))
        {
            return Err(format!(
                "Missing required argument '{}' for prompt '{}'",
                missing.name, self.name
            ));
        }
        Ok((self.render)(arguments))
    }
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// Read-only data exposed under URIs.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list_resources(&self) -> Vec<ResourceInfo>;

    /// `None` when the URI is not served by this provider.
    async fn read_resource(&self, uri: &str) -> Option<ResourceContents>;
}

pub struct McpServer {
    name: String,
    version: String,
    tools: ToolRegistry,
    prompts: BTreeMap<String, PromptTemplate>,
    resources: Vec<Arc<dyn ResourceProvider>>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tools", &self.tools)
            .field("prompts", &self.prompts.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.len())
            .finish()
    }
}

pub struct McpServerBuilder {
    name: String,
    version: String,
    tools: ToolRegistry,
    prompts: BTreeMap<String, PromptTemplate>,
    resources: Vec<Arc<dyn ResourceProvider>>,
}

impl McpServerBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompts.insert(prompt.name.clone(), prompt);
        self
    }

    pub fn resource(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resources.push(provider);
        self
    }

    pub fn build(self) -> McpServer {
        McpServer {
            name: self.name,
            version: self.version,
            tools: self.tools,
            prompts: self.prompts,
            resources: self.resources,
        }
    }
}

impl McpServer {
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder {
            name: "agentflow".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools: ToolRegistry::new(),
            prompts: BTreeMap::new(),
            resources: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one raw JSON-RPC message. Notifications produce no response.
    pub async fn handle_message(&self, message: Value) -> Option<JsonRpcResponse> {
        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str).map(str::to_string);

        match (id, method) {
            (None, Some(method)) => {
                tracing::debug!(server = %self.name, %method, "notification received");
                None
            }
            (Some(_), Some(_)) => match serde_json::from_value::<JsonRpcRequest>(message) {
                Ok(request) => Some(self.handle_request(request).await),
                Err(e) => Some(JsonRpcResponse::error(
                    RequestId::Null,
                    JsonRpcError::invalid_request(format!("Invalid request: {}", e)),
                )),
            },
            (id, None) => {
                let id = id
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or(RequestId::Null);
                Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request("Invalid request: missing method"),
                ))
            }
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        tracing::debug!(server = %self.name, method = %request.method, id = %request.id, "request received");
        let id = request.id.clone();
        let params = request.params.unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "initialize" => self.initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params).await,
            "prompts/list" => self.list_prompts(),
            "prompts/get" => self.get_prompt(params),
            "resources/list" => self.list_resources().await,
            "resources/read" => self.read_resource(params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => {
                tracing::warn!(server = %self.name, code = error.code, message = %error.message, "request failed");
                JsonRpcResponse::error(id, error)
            }
        }
    }

    fn initialize(&self) -> Result<Value, JsonRpcError> {
        let capabilities = ServerCapabilities {
            tools: Some(ListChanged::default()),
            prompts: (!self.prompts.is_empty()).then(ListChanged::default),
            resources: (!self.resources.is_empty()).then(ListChanged::default),
        };
        to_value(InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
            },
        })
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self
            .tools
            .definitions()
            .into_iter()
            .map(|d| McpToolInfo {
                name: d.name,
                description: d.description,
                input_schema: d.parameters,
            })
            .collect();
        to_value(ListToolsResult { tools })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(params)?;
        let tool = self
            .tools
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let arguments = match params.arguments {
            Value::Null => json!({}),
            other => other,
        };

        let result = match tool.call(arguments).await {
            Ok(value) => CallToolResult::text(result_text(&value)),
            Err(e) => {
                tracing::warn!(server = %self.name, tool = %params.name, error = %e, "tool failed");
                CallToolResult::error(format!("Error executing tool {}: {}", params.name, e))
            }
        };
        to_value(result)
    }

    fn list_prompts(&self) -> Result<Value, JsonRpcError> {
        to_value(ListPromptsResult {
            prompts: self.prompts.values().map(PromptTemplate::info).collect(),
        })
    }

    fn get_prompt(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: GetPromptParams = parse_params(params)?;
        let prompt = self
            .prompts
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown prompt: {}", params.name)))?;
        let text = prompt
            .render(&params.arguments)
            .map_err(JsonRpcError::invalid_params)?;

        to_value(GetPromptResult {
            description: Some(prompt.description.clone()),
            messages: vec![PromptMessage {
                role: PromptRole::User,
                content: Content::text(text),
            }],
        })
    }

    async fn list_resources(&self) -> Result<Value, JsonRpcError> {
        let mut resources = Vec::new();
        for provider in &self.resources {
            resources.extend(provider.list_resources().await);
        }
        to_value(ListResourcesResult { resources })
    }

    async fn read_resource(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: ReadResourceParams = parse_params(params)?;
        for provider in &self.resources {
            if let Some(contents) = provider.read_resource(&params.uri).await {
                return to_value(ReadResourceResult {
                    contents: vec![contents],
                });
            }
        }
        Err(JsonRpcError::invalid_params(format!("Unknown resource: {}", params.uri)))
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
