// ABOUTME: VisualAnalysisServer: loads images from disk as base64 and asks a vision model to describe them.
// ABOUTME: The description is meant to be used as a search query by a research agent.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use agentflow_core::tools::required_str;
use agentflow_core::{ChatMessage, ChatRequest, ImagePart, LlmClient, Tool, ToolError};

use crate::server::McpServer;

pub const DESCRIBE_IMAGE_PROMPT: &str = "Analyze this image in detail. Provide a concise, one-paragraph description. \
If it is a famous landmark, work of art, or specific location, identify it by name. \
Focus on the most important and defining elements in the image that would be useful for a web search. \
For example, instead of 'a building' say 'the Eiffel Tower in Paris'. \
Do not add any conversational filler, return only the description.";

/// Guess a MIME type from the file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

pub struct LoadImageTool;

#[async_trait]
impl Tool for LoadImageTool {
    fn name(&self) -> &str {
        "load_image_from_path"
    }

    fn description(&self) -> &str {
        "Loads an image from a server-accessible file path, encodes it to Base64 and determines its MIME type. \
         Returns 'base64_image_string' and 'mime_type', or an 'error' key if loading fails."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the image file, readable by the server"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let file_path = required_str(&args, "file_path")?;
        let path = Path::new(file_path);

        if !path.is_file() {
            return Ok(json!({"error": format!("File not found at path: {}", file_path)}));
        }

        match tokio::fs::read(path).await {
            Ok(bytes) => {
                tracing::info!(file_path, bytes = bytes.len(), "loaded image");
                Ok(json!({
                    "base64_image_string": STANDARD.encode(&bytes),
                    "mime_type": guess_mime_type(path),
                }))
            }
            Err(e) => Ok(json!({
                "error": format!("An unexpected error occurred while loading the image: {}", e)
            })),
        }
    }
}

pub struct DescribeImageTool {
    client: Arc<dyn LlmClient>,
}

impl DescribeImageTool {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    async fn describe(&self, data_base64: &str, mime_type: &str) -> Result<String, String> {
        STANDARD
            .decode(data_base64.trim())
            .map_err(|e| format!("invalid base64 image data: {}", e))?;

        let message = ChatMessage::user(DESCRIBE_IMAGE_PROMPT).with_image(ImagePart {
            mime_type: mime_type.to_string(),
            data_base64: data_base64.trim().to_string(),
        });
        let response = self
            .client
            .complete(&ChatRequest::new(vec![message]))
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.text().trim().to_string())
    }
}

#[async_trait]
impl Tool for DescribeImageTool {
    fn name(&self) -> &str {
        "get_image_description"
    }

    fn description(&self) -> &str {
        "Performs a deep analysis of a Base64 encoded image and returns a detailed, descriptive paragraph \
         about its content, naming known landmarks. Intended as a high-quality search query."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "base64_image_string": {"type": "string", "description": "The image encoded as Base64"},
                "mime_type": {"type": "string", "description": "The MIME type of the image (e.g. 'image/jpeg')"}
            },
            "required": ["base64_image_string", "mime_type"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let data = required_str(&args, "base64_image_string")?;
        let mime_type = required_str(&args, "mime_type")?;

        match self.describe(data, mime_type).await {
            Ok(description) => Ok(Value::String(description)),
            Err(e) => {
                tracing::warn!(error = %e, "image analysis failed");
                Ok(Value::String(format!("Error analyzing image: {}", e)))
            }
        }
    }
}

pub fn vision_server(client: Arc<dyn LlmClient>) -> McpServer {
    McpServer::builder()
        .name("VisualAnalysisServer")
        .tool(Arc::new(LoadImageTool))
        .tool(Arc::new(DescribeImageTool::new(client)))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::testing::ScriptedLlmClient;

    #[test]
    fn mime_types_from_extension() {
        assert_eq!(guess_mime_type(Path::new("/a/b.JPG")), "image/jpeg");
        assert_eq!(guess_mime_type(Path::new("x.png")), "image/png");
        assert_eq!(guess_mime_type(Path::new("x.unknown")), "application/octet-stream");
        assert_eq!(guess_mime_type(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn loads_image_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tower.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let out = LoadImageTool
            .call(json!({"file_path": path.to_str().unwrap()}))
            .await
            .unwrap();

        assert_eq!(out["mime_type"], "image/png");
        assert_eq!(out["base64_image_string"], STANDARD.encode([0x89, b'P', b'N', b'G']));
    }

    #[tokio::test]
    async fn missing_file_is_error_object() {
        let out = LoadImageTool
            .call(json!({"file_path": "/no/such/image.jpg"}))
            .await
            .unwrap();
        assert_eq!(out["error"], "File not found at path: /no/such/image.jpg");
    }

    #[tokio::test]
    async fn describes_image_with_model() {
        let llm = Arc::new(ScriptedLlmClient::new().text("  The Eiffel Tower in Paris at dusk.  "));
        let tool = DescribeImageTool::new(llm.clone());
        let data = STANDARD.encode(b"fake image bytes");

        let out = tool
            .call(json!({"base64_image_string": data, "mime_type": "image/jpeg"}))
            .await
            .unwrap();

        assert_eq!(out, json!("The Eiffel Tower in Paris at dusk."));
        let sent = &llm.requests()[0].messages[0];
        assert_eq!(sent.images[0].mime_type, "image/jpeg");
        assert_eq!(sent.images[0].data_base64, data);
        assert_eq!(sent.content, DESCRIBE_IMAGE_PROMPT);
    }

    #[tokio::test]
    async fn invalid_base64_is_reported_without_model_call() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let tool = DescribeImageTool::new(llm.clone());

        let out = tool
            .call(json!({"base64_image_string": "***not base64***", "mime_type": "image/png"}))
            .await
            .unwrap();

        assert!(out.as_str().unwrap().starts_with("Error analyzing image: invalid base64"));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_reported_as_text() {
        let llm = Arc::new(ScriptedLlmClient::new().error("quota exceeded"));
        let tool = DescribeImageTool::new(llm);
        let out = tool
            .call(json!({"base64_image_string": STANDARD.encode(b"x"), "mime_type": "image/png"}))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().contains("quota exceeded"));
    }
}
