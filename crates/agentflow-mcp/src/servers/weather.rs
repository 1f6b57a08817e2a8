// ABOUTME: WeatherAssistant server: an OpenWeather current-conditions tool and a two-city comparison prompt.
// ABOUTME: Lookup failures are returned as {"error": ...} objects so the model can explain them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use agentflow_core::tools::required_str;
use agentflow_core::{Tool, ToolError};

use crate::server::{McpServer, PromptTemplate};

pub const OPENWEATHER_URL: &str = "http://api.openweathermap.org";

pub struct GetWeatherTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GetWeatherTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: OPENWEATHER_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn lookup(&self, location: &str) -> Value {
        let Some(api_key) = &self.api_key else {
            return error("OpenWeatherMap API key is not configured on the server");
        };

        tracing::info!(location, "fetching current weather");
        let response = match self
            .client
            .get(format!("{}/data/2.5/weather", self.base_url))
            .query(&[("q", location), ("appid", api_key.as_str()), ("units", "metric")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return error(format!("A network error occurred: {}", e)),
        };

        match response.status().as_u16() {
            200..=299 => {}
            404 => {
                return error(format!(
                    "Could not find weather data for '{}'. Please check the location name.",
                    location
                ));
            }
            401 => return error("Authentication failed. The API key is likely invalid or inactive."),
            status => return error(format!("An HTTP error occurred: status {}", status)),
        }

        match response.json::<Value>().await.ok().and_then(|body| summarize(&body)) {
            Some(summary) => summary,
            None => error("Received unexpected data format from the weather API"),
        }
    }
}

fn error(message: impl Into<String>) -> Value {
    json!({"error": message.into()})
}

fn summarize(body: &Value) -> Option<Value> {
    Some(json!({
        "location": body.get("name")?.as_str()?,
        "weather": body.get("weather")?.get(0)?.get("description")?.as_str()?,
        "temperature_celsius": body.get("main")?.get("temp")?.as_f64()?,
        "feels_like_celsius": body.get("main")?.get("feels_like")?.as_f64()?,
        "humidity": body.get("main")?.get("humidity")?.as_f64()?,
        "wind_speed_mps": body.get("wind")?.get("speed")?.as_f64()?,
    }))
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Fetches the current weather for a specified location using the OpenWeather API. \
         Returns weather information or an error message."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city name and optional country code (e.g. \"London, uk\")"
                }
            },
            "required": ["location"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let location = required_str(&args, "location")?;
        Ok(self.lookup(location).await)
    }
}

pub fn compare_weather_prompt() -> PromptTemplate {
    PromptTemplate::new(
        "compare_weather_prompt",
        "Generates a clear, comparative summary of the weather between two specified locations. \
         The best choice when a user asks to compare the weather between two places.",
        |args| {
            let a = args.get("location_a").map(String::as_str).unwrap_or_default();
            let b = args.get("location_b").map(String::as_str).unwrap_or_default();
            format!(
                "You are acting as a helpful weather analyst. Your goal is to provide a clear, \
easy-to-read comparison of the weather in two different locations for a user.

The user wants to compare the weather between '{a}' and '{b}'.

To accomplish this, follow these steps:
1. First, gather the necessary weather data for both '{a}' and '{b}'.
2. Once you have the weather data for both locations, DO NOT simply list the raw results.
3. Instead, synthesize the information into a concise summary. Highlight the key differences, \
focusing on temperature, the general conditions (e.g. sunny vs rainy) and wind speed.
4. Present the comparison in a structured format, like a markdown table or a clear bulleted list."
            )
        },
    )
    .with_argument("location_a", "The first city for comparison (e.g. London)")
    .with_argument("location_b", "The second city for comparison (e.g. Paris)")
}

pub fn weather_server(tool: GetWeatherTool) -> McpServer {
    McpServer::builder()
        .name("WeatherAssistant")
        .tool(Arc::new(tool))
        .prompt(compare_weather_prompt())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn london() -> Value {
        json!({
            "name": "London",
            "weather": [{"description": "light rain"}],
            "main": {"temp": 12.5, "feels_like": 11.0, "humidity": 81},
            "wind": {"speed": 4.1}
        })
    }

    #[tokio::test]
    async fn returns_summary() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London, uk"))
            .and(query_param("appid", "k"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(london()))
            .mount(&mock)
            .await;

        let tool = GetWeatherTool::new(Some("k".to_string())).with_base_url(&mock.uri());
        let out = tool.call(json!({"location": "London, uk"})).await.unwrap();

        assert_eq!(out["location"], "London");
        assert_eq!(out["weather"], "light rain");
        assert_eq!(out["temperature_celsius"], 12.5);
        assert_eq!(out["humidity"], 81.0);
        assert_eq!(out["wind_speed_mps"], 4.1);
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let out = GetWeatherTool::new(Some("  ".to_string())).lookup("Paris").await;
        assert!(out["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn http_statuses_map_to_messages() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "Atlantis"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "Paris"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "Rome"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "Oslo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Oslo"})))
            .mount(&mock)
            .await;

        let tool = GetWeatherTool::new(Some("k".to_string())).with_base_url(&mock.uri());
        let msg = |v: Value| v["error"].as_str().unwrap().to_string();

        assert!(msg(tool.lookup("Atlantis").await).contains("Could not find weather data for 'Atlantis'"));
        assert!(msg(tool.lookup("Paris").await).starts_with("Authentication failed"));
        assert!(msg(tool.lookup("Rome").await).contains("503"));
        assert!(msg(tool.lookup("Oslo").await).contains("unexpected data format"));
    }

    #[tokio::test]
    async fn network_failure_is_reported() {
        let tool = GetWeatherTool::new(Some("k".to_string())).with_base_url("http://127.0.0.1:1");
        let out = tool.lookup("London").await;
        assert!(out["error"].as_str().unwrap().starts_with("A network error occurred"));
    }

    #[test]
    fn comparison_prompt_mentions_both_cities() {
        let args: HashMap<String, String> = [
            ("location_a".to_string(), "London".to_string()),
            ("location_b".to_string(), "Paris".to_string()),
        ]
        .into_iter()
        .collect();
        let text = compare_weather_prompt().render(&args).unwrap();
        assert!(text.contains("between 'London' and 'Paris'"));

        let missing = compare_weather_prompt().render(&HashMap::new()).unwrap_err();
        assert!(missing.contains("location_a"));
    }
}
