// ABOUTME: YAML server-set configuration and a client that holds one MCP session per named server.
// ABOUTME: Remote tools are adapted to the core Tool trait so agents can call them like local tools.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentflow_core::{Tool, ToolError, ToolRegistry};

use crate::client::{HttpConnection, McpClient, McpConnection, McpError, StdioConnection};
use crate::protocol::McpToolInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ServerConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
}

impl ServerConfig {
    pub async fn open(&self) -> Result<Arc<dyn McpConnection>, McpError> {
        Ok(match self {
            ServerConfig::Stdio { command, args, env } => {
                Arc::new(StdioConnection::spawn(command, args, env).await?)
            }
            ServerConfig::Http { url } => Arc::new(HttpConnection::new(url)),
        })
    }
}

/// Named servers, kept in name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServersConfig {
    pub servers: BTreeMap<String, ServerConfig>,
}

impl ServersConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, McpError> {
        serde_yaml::from_str(text).map_err(|e| McpError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, McpError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| McpError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    pub fn with_server(mut self, name: &str, config: ServerConfig) -> Self {
        self.servers.insert(name.to_string(), config);
        self
    }
}

#[derive(Debug, Default)]
pub struct MultiServerClient {
    clients: BTreeMap<String, Arc<McpClient>>,
}

impl MultiServerClient {
    /// Connect to every configured server. Servers that fail are logged and left out.
    pub async fn connect(config: &ServersConfig) -> Self {
        let mut clients = BTreeMap::new();
        for (name, server) in &config.servers {
            let connected = match server.open().await {
                Ok(conn) => McpClient::connect(name, conn).await,
                Err(e) => Err(e),
            };
            match connected {
                Ok(client) => {
                    clients.insert(name.clone(), Arc::new(client));
                }
                Err(e) => tracing::warn!(server = %name, error = %e, "could not connect to MCP server"),
            }
        }
        Self { clients }
    }

    pub fn from_clients(clients: Vec<McpClient>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.name().to_string(), Arc::new(c)))
                .collect(),
        }
    }

    pub fn client(&self, name: &str) -> Option<&Arc<McpClient>> {
        self.clients.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Every tool from every server, listed concurrently.
    pub async fn all_tools(&self) -> Result<Vec<Arc<dyn Tool>>, McpError> {
        let listings = futures::future::join_all(self.clients.values().map(|client| async move {
            client
                .list_tools()
                .await
                .map(|tools| (Arc::clone(client), tools))
        }))
        .await;

        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for listing in listings {
            let (client, infos) = listing?;
            for info in infos {
                tools.push(Arc::new(McpToolAdapter::new(Arc::clone(&client), info)));
            }
        }
        Ok(tools)
    }

    pub async fn tool_registry(&self) -> Result<ToolRegistry, McpError> {
        let mut registry = ToolRegistry::new();
        for tool in self.all_tools().await? {
            registry.register(tool);
        }
        Ok(registry)
    }
}

/// A remote MCP tool exposed through the core `Tool` trait.
pub struct McpToolAdapter {
    client: Arc<McpClient>,
    info: McpToolInfo,
}

impl McpToolAdapter {
    pub fn new(client: Arc<McpClient>, info: McpToolInfo) -> Self {
        Self { client, info }
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.info.description
    }

    fn parameters_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let result = self
            .client
            .call_tool(&self.info.name, args)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let text = result.text_content();
        if result.is_error {
            return Err(ToolError::Execution(text));
        }
        Ok(Value::String(text))
    }
}
