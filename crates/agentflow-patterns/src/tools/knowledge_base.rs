// ABOUTME: Knowledge-base retrieval tool that hands the model the whole JSON file on disk.
// ABOUTME: No filtering; the model answers the question from the full contents.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Value, json};

use agentflow_core::tools::required_str;
use agentflow_core::{Tool, ToolError};

pub struct KnowledgeBaseTool {
    path: PathBuf,
}

impl KnowledgeBaseTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Value, ToolError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ToolError::Execution(format!(
                "failed to read knowledge base {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ToolError::Execution(format!(
                "knowledge base {} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "retrieve_from_kb"
    }

    fn description(&self) -> &str {
        "Answer questions about Educative courses and content"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "The user's question about Educative"}
            },
            "required": ["question"],
            "additionalProperties": false
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let question = required_str(&args, "question")?;
        tracing::info!(question, "calling knowledge base");
        self.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn returns_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"records": [{{"id": 1, "question": "What is Educative?", "answer": "A learning platform."}}]}}"#
        )
        .unwrap();

        let tool = KnowledgeBaseTool::new(file.path());
        let result = tool
            .call(json!({"question": "What is Educative?"}))
            .await
            .unwrap();
        assert_eq!(result["records"][0]["id"], 1);
    }

    #[tokio::test]
    async fn missing_file_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = KnowledgeBaseTool::new(dir.path().join("absent.json"));
        let err = tool.call(json!({"question": "?"})).await.unwrap_err();
        assert!(err.to_string().contains("failed to read knowledge base"));
    }

    #[tokio::test]
    async fn invalid_json_is_execution_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = KnowledgeBaseTool::new(file.path())
            .call(json!({"question": "?"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
