// ABOUTME: Web search tool backed by the Serper Google Search API.
// ABOUTME: Returns organic results trimmed to title, link and snippet.

use async_trait::async_trait;
use serde_json::{Value, json};

use agentflow_core::tools::required_str;
use agentflow_core::{Tool, ToolError};

use crate::tools::http_error;

pub const SERPER_URL: &str = "https://google.serper.dev/search";
const DEFAULT_RESULTS: usize = 10;

pub struct SerperSearchTool {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
}

impl SerperSearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: SERPER_URL.to_string(),
            max_results: DEFAULT_RESULTS,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl Tool for SerperSearchTool {
    fn name(&self) -> &str {
        "search_the_internet"
    }

    fn description(&self) -> &str {
        "Search the internet with a query and return the top organic results"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_query": {"type": "string", "description": "Query to search the internet with"}
            },
            "required": ["search_query"],
            "additionalProperties": false
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let query = required_str(&args, "search_query")?;
        tracing::info!(query, "searching the web");

        let body: Value = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({"q": query, "num": self.max_results}))
            .send()
            .await
            .map_err(|e| http_error("search request failed", e))?
            .error_for_status()
            .map_err(|e| http_error("search api error", e))?
            .json()
            .await
            .map_err(|e| http_error("search response was not JSON", e))?;

        let results: Vec<Value> = body
            .get("organic")
            .and_then(|o| o.as_array())
            .map(|items| {
                items
                    .iter()
                    .take(self.max_results)
                    .map(|item| {
                        json!({
                            "title": item.get("title").cloned().unwrap_or(Value::Null),
                            "link": item.get("link").cloned().unwrap_or(Value::Null),
                            "snippet": item.get("snippet").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn trims_organic_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-API-KEY", "serper-key"))
            .and(body_partial_json(json!({"q": "events in New York"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic": [
                    {"title": "Jazz night", "link": "https://a.test", "snippet": "Live jazz", "position": 1},
                    {"title": "Food fair", "link": "https://b.test", "snippet": "Street food", "position": 2},
                    {"title": "Book club", "link": "https://c.test", "snippet": "Monthly", "position": 3}
                ]
            })))
            .mount(&server)
            .await;

        let tool = SerperSearchTool::new("serper-key")
            .with_endpoint(&server.uri())
            .with_max_results(2);
        let result = tool
            .call(json!({"search_query": "events in New York"}))
            .await
            .unwrap();

        let items = result.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "Jazz night");
        assert!(items[0].get("position").is_none());
    }

    #[tokio::test]
    async fn unauthorized_is_execution_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = SerperSearchTool::new("bad")
            .with_endpoint(&server.uri())
            .call(json!({"search_query": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
