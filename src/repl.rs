// ABOUTME: Chat session behind the `chat` command: routes REPL commands to MCP servers or the agent.
// ABOUTME: Terminal I/O stays in main; this type only turns a line into a reply.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use agentflow_core::LlmClient;
use agentflow_mcp::agent::MULTI_SERVER_AGENT_PROMPT;
use agentflow_mcp::commands::{
    bind_prompt_arguments, format_prompt_listing, format_resource_listing, help_text, resource_message,
};
use agentflow_mcp::{ChatAgent, McpClient, MultiServerClient, ReplCommand, parse_command};

pub const THREAD_ID: &str = "multi-server-session";

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Exit,
    Nothing,
    Text(String),
    /// A resource was read; the caller asks what to do with it before
    /// sending it on with [`ChatSession::send`].
    Resource(String),
}

pub struct ChatSession {
    servers: MultiServerClient,
    agent: ChatAgent,
}

impl ChatSession {
    pub async fn new(
        servers: MultiServerClient,
        llm: Arc<dyn LlmClient>,
        max_steps: usize,
    ) -> anyhow::Result<Self> {
        if servers.is_empty() {
            return Err(anyhow!("no MCP server could be reached"));
        }
        let tools = servers.tool_registry().await.context("listing server tools")?;
        tracing::info!(servers = ?servers.names(), tools = ?tools.names(), "chat session ready");
        let agent = ChatAgent::new(llm, tools, MULTI_SERVER_AGENT_PROMPT).with_max_steps(max_steps);
        Ok(Self { servers, agent })
    }

    pub fn multi_server(&self) -> bool {
        self.servers.len() > 1
    }

    pub fn help(&self) -> String {
        help_text(self.multi_server())
    }

    pub fn agent(&self) -> &ChatAgent {
        &self.agent
    }

    /// Handle one line of input. Command mistakes come back as text so the
    /// loop keeps going; transport and model failures are errors.
    pub async fn handle_line(&self, line: &str) -> anyhow::Result<Reply> {
        let command = match parse_command(line, self.multi_server()) {
            Ok(command) => command,
            Err(e) => return Ok(Reply::Text(e.to_string())),
        };

        match command {
            ReplCommand::Exit => Ok(Reply::Exit),
            ReplCommand::Empty => Ok(Reply::Nothing),
            ReplCommand::ListPrompts => Ok(Reply::Text(self.list_prompts().await)),
            ReplCommand::ListResources => Ok(Reply::Text(self.list_resources().await)),
            ReplCommand::Prompt { server, name, args } => {
                self.run_prompt(server.as_deref(), &name, &args).await
            }
            ReplCommand::Resource { server, uri } => self.load_resource(&server, &uri).await,
            ReplCommand::Message(text) => Ok(Reply::Text(self.send(&text).await?)),
        }
    }

    pub async fn send(&self, message: &str) -> anyhow::Result<String> {
        Ok(self.agent.invoke(THREAD_ID, message).await?)
    }

    async fn list_prompts(&self) -> String {
        let mut listings = Vec::new();
        for name in self.servers.names() {
            let Some(client) = self.servers.client(name) else { continue };
            match client.list_prompts().await {
                Ok(prompts) => listings.push((name.to_string(), prompts)),
                Err(e) => tracing::warn!(server = name, error = %e, "could not list prompts"),
            }
        }
        format_prompt_listing(&listings, self.multi_server())
    }

    async fn list_resources(&self) -> String {
        let mut listings = Vec::new();
        for name in self.servers.names() {
            let Some(client) = self.servers.client(name) else { continue };
            match client.list_resources().await {
                Ok(resources) => listings.push((name.to_string(), resources)),
                Err(e) => tracing::warn!(server = name, error = %e, "could not list resources"),
            }
        }
        format_resource_listing(&listings)
    }

    fn resolve_server(&self, server: Option<&str>) -> Result<&Arc<McpClient>, String> {
        let name = match server {
            Some(name) => name,
            None => self
                .servers
                .names()
                .first()
                .copied()
                .ok_or_else(|| "No server connected.".to_string())?,
        };
        self.servers
            .client(name)
            .ok_or_else(|| format!("Server '{}' not found.", name))
    }

    async fn run_prompt(&self, server: Option<&str>, name: &str, args: &[String]) -> anyhow::Result<Reply> {
        let client = match self.resolve_server(server) {
            Ok(client) => client,
            Err(message) => return Ok(Reply::Text(message)),
        };

        let prompts = client.list_prompts().await?;
        let Some(info) = prompts.iter().find(|p| p.name == name) else {
            return Ok(Reply::Text(format!(
                "Prompt '{}' not found on server '{}'.",
                name,
                client.name()
            )));
        };

        let arguments = match bind_prompt_arguments(info, args) {
            Ok(arguments) => arguments,
            Err(e) => return Ok(Reply::Text(e.to_string())),
        };

        let result = client.get_prompt(name, &arguments).await?;
        let Some(text) = result.first_text() else {
            return Ok(Reply::Text(format!("Prompt '{}' returned no text.", name)));
        };
        tracing::info!(server = client.name(), prompt = name, "running prompt");
        Ok(Reply::Text(self.send(text).await?))
    }

    async fn load_resource(&self, server: &str, uri: &str) -> anyhow::Result<Reply> {
        let client = match self.resolve_server(Some(server)) {
            Ok(client) => client,
            Err(message) => return Ok(Reply::Text(message)),
        };

        let contents = client.read_resource(uri).await?;
        let text = contents
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Ok(Reply::Text(format!("Resource '{}' has no text content.", uri)));
        }
        Ok(Reply::Resource(text))
    }
}

/// Drive a session until `exit` or end of input. A failed turn is reported
/// and the conversation carries on; only I/O errors end the loop.
pub async fn run_chat<R, W>(session: &ChatSession, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    writer.write_all(format!("{}\n", session.help()).as_bytes()).await?;

    loop {
        writer.write_all(b"\nYou: ").await?;
        writer.flush().await?;
        let Some(line) = lines.next_line().await? else { break };

        let turn = match session.handle_line(&line).await {
            Ok(Reply::Exit) => break,
            Ok(Reply::Nothing) => continue,
            Ok(Reply::Text(text)) => Ok(text),
            Ok(Reply::Resource(content)) => {
                writer
                    .write_all(b"Resource loaded. What should I do with it? (press Enter to just remember it)\n> ")
                    .await?;
                writer.flush().await?;
                let action = lines.next_line().await?.unwrap_or_default();
                session.send(&resource_message(&content, Some(&action))).await
            }
            Err(e) => Err(e),
        };

        let out = match turn {
            Ok(text) => format!("\n{}\n", text),
            Err(e) => {
                tracing::error!(error = %e, "chat turn failed");
                format!("\nAn error occurred: {:#}\n", e)
            }
        };
        writer.write_all(out.as_bytes()).await?;
    }

    writer.flush().await
}
