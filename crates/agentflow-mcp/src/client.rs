// ABOUTME: MCP client: a connection trait with stdio child-process, HTTP and in-process implementations.
// ABOUTME: McpClient performs the initialize handshake and exposes typed tools/prompts/resources calls.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::*;
use crate::server::McpServer;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("MCP server returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid MCP response: {0}")]
    InvalidResponse(String),

    #[error("MCP server terminated unexpectedly")]
    Terminated,

    #[error("MCP request '{method}' timed out after {seconds}s")]
    Timeout { method: String, seconds: u64 },

    #[error("MCP configuration error: {0}")]
    Config(String),
}

/// One JSON-RPC channel to a server.
#[async_trait]
pub trait McpConnection: Send + Sync {
    /// Send a request and wait for its `result`.
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError>;

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError>;
}

fn into_result(response: JsonRpcResponse) -> Result<Value, McpError> {
    if let Some(error) = response.error {
        return Err(McpError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

type Pending = Mutex<HashMap<i64, oneshot::Sender<Result<Value, McpError>>>>;

/// A server running as a child process speaking newline-delimited JSON.
///
/// The child is owned here, not by the state the reader task shares, so
/// dropping the connection kills the process and stops the reader.
pub struct StdioConnection {
    inner: Arc<StdioInner>,
    timeout: Duration,
    child: Child,
    reader: JoinHandle<()>,
}

struct StdioInner {
    command: String,
    writer: Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicI64,
}

impl StdioConnection {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("failed to capture server stdout".to_string()))?;

        let inner = Arc::new(StdioInner {
            command: command.to_string(),
            writer: Mutex::new(stdin),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        });

        let shared = Arc::clone(&inner);
        let reader = tokio::spawn(async move { shared.reader_loop(stdout).await });

        tracing::info!(command, pid = ?child.id(), "spawned MCP server process");
        Ok(Self {
            inner,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            child,
            reader,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// OS process id of the server, while it is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

impl Drop for StdioConnection {
    fn drop(&mut self) {
        self.reader.abort();
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(command = %self.inner.command, error = %e, "MCP server already exited");
        }
    }
}

impl StdioInner {
    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(message) => self.dispatch(message).await,
                Err(e) => tracing::warn!(command = %self.command, line = trimmed, error = %e, "non-JSON line from MCP server"),
            }
        }

        tracing::info!(command = %self.command, "MCP server closed its stdout");
        // Dropping the senders wakes every waiter with Terminated.
        self.pending.lock().await.clear();
    }

    async fn dispatch(&self, message: Value) {
        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str).map(str::to_string);

        match (id, method) {
            (Some(id), Some(method)) => self.answer_server_request(id, &method).await,
            (Some(id), None) => {
                let Some(key) = id.as_i64() else {
                    tracing::debug!(%id, "response with non-numeric id ignored");
                    return;
                };
                let sender = self.pending.lock().await.remove(&key);
                let Some(sender) = sender else {
                    tracing::debug!(id = key, "response for unknown request");
                    return;
                };
                let outcome = serde_json::from_value::<JsonRpcResponse>(message)
                    .map_err(|e| McpError::InvalidResponse(e.to_string()))
                    .and_then(into_result);
                let _ = sender.send(outcome);
            }
            (None, Some(method)) => tracing::debug!(%method, "notification from MCP server"),
            (None, None) => tracing::debug!("ignoring message without id or method"),
        }
    }

    async fn answer_server_request(&self, id: Value, method: &str) {
        let reply = match method {
            "ping" => json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": {}}),
            other => {
                tracing::warn!(method = other, "server sent unsupported request");
                json!({
                    "jsonrpc": JSONRPC_VERSION,
                    "id": id,
                    "error": JsonRpcError::method_not_found(other),
                })
            }
        };
        if let Err(e) = self.write(&reply).await {
            tracing::warn!(error = %e, "failed to answer server request");
        }
    }

    async fn write(&self, message: &Value) -> Result<(), McpError> {
        let mut encoded =
            serde_json::to_string(message).map_err(|e| McpError::Transport(e.to_string()))?;
        encoded.push('\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(encoded.as_bytes())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        writer.flush().await.map_err(|e| McpError::Transport(e.to_string()))
    }
}

#[async_trait]
impl McpConnection for StdioConnection {
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        let message = serde_json::to_value(&request).map_err(|e| McpError::Transport(e.to_string()))?;
        if let Err(e) = self.inner.write(&message).await {
            self.inner.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::Terminated),
            Err(_) => {
                self.inner.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let message =
            serde_json::to_value(&notification).map_err(|e| McpError::Transport(e.to_string()))?;
        self.inner.write(&message).await
    }
}

/// A server reachable through a single JSON-RPC POST endpoint.
pub struct HttpConnection {
    client: reqwest::Client,
    url: String,
    next_id: AtomicI64,
    timeout: Duration,
}

impl HttpConnection {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            next_id: AtomicI64::new(1),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post(&self, method: &str, body: &Value) -> Result<reqwest::Response, McpError> {
        let response = self
            .client
            .post(&self.url)
            .header("accept", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    McpError::Timeout {
                        method: method.to_string(),
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    McpError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!("HTTP {}: {}", status, text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl McpConnection for HttpConnection {
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_value(JsonRpcRequest::new(id, method, params))
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let response = self.post(method, &body).await?;
        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| McpError::InvalidResponse(e.to_string()))?;
        into_result(response)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let body = serde_json::to_value(JsonRpcNotification::new(method, params))
            .map_err(|e| McpError::Transport(e.to_string()))?;
        self.post(method, &body).await.map(|_| ())
    }
}

/// Talks to a server living in the same process. Used by tests and the
/// chat command when no external servers are configured.
pub struct InProcessConnection {
    server: Arc<McpServer>,
    next_id: AtomicI64,
}

impl InProcessConnection {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl McpConnection for InProcessConnection {
    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = serde_json::to_value(JsonRpcRequest::new(id, method, params))
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let response = self
            .server
            .handle_message(message)
            .await
            .ok_or_else(|| McpError::InvalidResponse("no response to request".to_string()))?;
        into_result(response)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let message = serde_json::to_value(JsonRpcNotification::new(method, params))
            .map_err(|e| McpError::Transport(e.to_string()))?;
        self.server.handle_message(message).await;
        Ok(())
    }
}

pub struct McpClient {
    name: String,
    connection: Arc<dyn McpConnection>,
    server: InitializeResult,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name)
            .field("server", &self.server.server_info.name)
            .finish()
    }
}

impl McpClient {
    /// Run the initialize handshake over `connection`.
    pub async fn connect(name: &str, connection: Arc<dyn McpConnection>) -> Result<Self, McpError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION")}
        });
        let server: InitializeResult = decode(connection.request("initialize", params).await?)?;
        connection.notify("notifications/initialized", Value::Null).await?;

        tracing::info!(
            client = name,
            server = %server.server_info.name,
            protocol = %server.protocol_version,
            "connected to MCP server"
        );
        Ok(Self {
            name: name.to_string(),
            connection,
            server,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_info(&self) -> &InitializeResult {
        &self.server
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let result: ListToolsResult = decode(self.connection.request("tools/list", json!({})).await?)?;
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        tracing::debug!(client = %self.name, tool = name, "calling MCP tool");
        decode(
            self.connection
                .request("tools/call", json!({"name": name, "arguments": arguments}))
                .await?,
        )
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptInfo>, McpError> {
        let result: ListPromptsResult =
            decode(self.connection.request("prompts/list", json!({})).await?)?;
        Ok(result.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        decode(
            self.connection
                .request("prompts/get", json!({"name": name, "arguments": arguments}))
                .await?,
        )
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>, McpError> {
        let result: ListResourcesResult =
            decode(self.connection.request("resources/list", json!({})).await?)?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, McpError> {
        let result: ReadResourceResult =
            decode(self.connection.request("resources/read", json!({"uri": uri})).await?)?;
        Ok(result.contents)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, McpError> {
    serde_json::from_value(value).map_err(|e| McpError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::PromptTemplate;
    use agentflow_core::{Tool, ToolError};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn call(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    fn in_process() -> Arc<dyn McpConnection> {
        let server = McpServer::builder()
            .name("echo-server")
            .tool(Arc::new(Echo))
            .prompt(PromptTemplate::new("p", "a prompt", |_| "hello".to_string()))
            .build();
        Arc::new(InProcessConnection::new(Arc::new(server)))
    }

    #[tokio::test]
    async fn connect_and_call_in_process() {
        let client = McpClient::connect("echo", in_process()).await.unwrap();
        assert_eq!(client.server_info().server_info.name, "echo-server");

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "echo");

        let result = client.call_tool("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(result.text_content(), r#"{"a":1}"#);

        let prompt = client.get_prompt("p", &HashMap::new()).await.unwrap();
        assert_eq!(prompt.first_text(), Some("hello"));
    }

    #[tokio::test]
    async fn rpc_errors_surface_with_code() {
        let client = McpClient::connect("echo", in_process()).await.unwrap();
        let err = client.read_resource("nothing://here").await.unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: INVALID_PARAMS, .. }));
    }

    #[tokio::test]
    async fn http_connection_handshake_and_tools() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "remote", "version": "1"}
                }
            })))
            .mount(&mock)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(&mock)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {"tools": [{"name": "get_weather", "description": "d", "inputSchema": {"type": "object"}}]}
            })))
            .mount(&mock)
            .await;

        let conn = HttpConnection::new(&format!("{}/mcp", mock.uri()));
        let client = McpClient::connect("remote", Arc::new(conn)).await.unwrap();
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "get_weather");
    }

    #[tokio::test]
    async fn http_status_error_is_transport_error() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&mock)
            .await;

        let conn = HttpConnection::new(&format!("{}/mcp", mock.uri()));
        let err = conn.request("ping", Value::Null).await.unwrap_err();
        assert!(matches!(err, McpError::Transport(ref m) if m.contains("500")));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let err = StdioConnection::spawn("/definitely/not/a/binary", &[], &HashMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::Spawn { .. }));
    }

    #[cfg(unix)]
    async fn sh(script: &str) -> StdioConnection {
        StdioConnection::spawn("sh", &["-c".to_string(), script.to_string()], &HashMap::new())
            .await
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdio_matches_responses_by_id() {
        // Answers the second request first.
        let conn = sh(r#"read a; read b
echo '{"jsonrpc":"2.0","id":2,"result":{"n":2}}'
echo '{"jsonrpc":"2.0","id":1,"result":{"n":1}}'
sleep 5"#)
        .await;

        let (first, second) = tokio::join!(
            conn.request("first", Value::Null),
            conn.request("second", Value::Null)
        );

        assert_eq!(first.unwrap(), json!({"n": 1}));
        assert_eq!(second.unwrap(), json!({"n": 2}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdio_answers_server_ping() {
        // Sends a ping, then returns whatever the client wrote back as the result.
        let conn = sh(r#"read req
echo '{"jsonrpc":"2.0","id":"s1","method":"ping"}'
read -r pong
printf '{"jsonrpc":"2.0","id":1,"result":%s}\n' "$pong"
sleep 5"#)
        .await;

        let reply = conn.request("tools/list", Value::Null).await.unwrap();

        assert_eq!(reply["id"], "s1");
        assert_eq!(reply["jsonrpc"], "2.0");
        assert_eq!(reply["result"], json!({}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdio_request_times_out() {
        let conn = sh("read req; sleep 5")
            .await
            .with_timeout(Duration::from_millis(100));

        let err = conn.request("tools/list", Value::Null).await.unwrap_err();

        assert!(matches!(err, McpError::Timeout { ref method, .. } if method == "tools/list"));
        assert!(conn.inner.pending.lock().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdio_server_exit_is_terminated() {
        let conn = sh("read req; exit 0").await;

        let err = conn.request("tools/list", Value::Null).await.unwrap_err();

        assert!(matches!(err, McpError::Terminated));
    }

    #[cfg(target_os = "linux")]
    fn process_running(pid: u32) -> bool {
        // A killed child may linger as a zombie until reaped.
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_stdio_connection_kills_server() {
        let conn = StdioConnection::spawn("sleep", &["30".to_string()], &HashMap::new())
            .await
            .unwrap();
        let pid = conn.pid().unwrap();
        assert!(process_running(pid));

        drop(conn);

        let mut running = true;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            running = process_running(pid);
            if !running {
                break;
            }
        }
        assert!(!running, "server process {} outlived its connection", pid);
    }
}
