// ABOUTME: Serves an McpServer over newline-delimited stdio or a single POST /mcp HTTP endpoint.
// ABOUTME: The HTTP mode answers every request with plain JSON and notifications with 202.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use http::StatusCode;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tower_http::trace::TraceLayer;

use crate::protocol::{JsonRpcError, JsonRpcResponse, RequestId};
use crate::server::McpServer;

/// Serve on the process's stdin/stdout until EOF.
pub async fn serve_stdio(server: Arc<McpServer>) -> std::io::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_lines(server, stdin, tokio::io::stdout()).await
}

/// Read one JSON message per line and write one response per line.
pub async fn serve_lines<R, W>(server: Arc<McpServer>, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tracing::info!(server = %server.name(), "serving MCP over stdio");
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(trimmed) {
            Ok(message) => server.handle_message(message).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable message on stdin");
                Some(JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error()))
            }
        };

        if let Some(response) = response {
            let mut encoded = serde_json::to_string(&response).map_err(std::io::Error::other)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    tracing::info!(server = %server.name(), "stdin closed, shutting down");
    Ok(())
}

pub fn http_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_post))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

pub async fn serve_http(server: Arc<McpServer>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(server = %server.name(), %addr, "serving MCP over HTTP at /mcp");
    axum::serve(listener, http_router(server)).await
}

async fn handle_post(State(server): State<Arc<McpServer>>, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable HTTP message");
            let error = JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error());
            return (StatusCode::BAD_REQUEST, axum::Json(error)).into_response();
        }
    };

    match server.handle_message(message).await {
        Some(response) => axum::Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
