// ABOUTME: Model Context Protocol support: wire types, a tool-exposure server, stdio/HTTP transports and clients.
// ABOUTME: Also a multi-server client, a chat agent over remote tools, REPL commands and example servers.

pub mod agent;
pub mod client;
pub mod commands;
pub mod multi;
pub mod protocol;
pub mod server;
pub mod servers;
pub mod transport;

pub use agent::ChatAgent;
pub use client::{HttpConnection, InProcessConnection, McpClient, McpConnection, McpError, StdioConnection};
pub use commands::{CommandError, ReplCommand, parse_command};
pub use multi::{McpToolAdapter, MultiServerClient, ServerConfig, ServersConfig};
pub use server::{McpServer, PromptTemplate, ResourceProvider};
pub use transport::{http_router, serve_http, serve_stdio};
