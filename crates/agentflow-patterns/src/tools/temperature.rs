// ABOUTME: Current-temperature tool backed by the Open-Meteo forecast API.
// ABOUTME: Takes coordinates the model deduced and returns degrees Celsius.

use async_trait::async_trait;
use serde_json::{Value, json};

use agentflow_core::tools::required_f64;
use agentflow_core::{Tool, ToolError};

use crate::tools::http_error;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

pub struct TemperatureTool {
    client: reqwest::Client,
    base_url: String,
}

impl TemperatureTool {
    pub fn new() -> Self {
        Self::with_base_url(OPEN_METEO_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }

    pub async fn fetch(&self, lat: f64, lon: f64) -> Result<f64, ToolError> {
        tracing::info!(lat, lon, "calling weather api");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current", "temperature_2m".to_string()),
            ])
            .send()
            .await
            .map_err(|e| http_error("weather request failed", e))?
            .error_for_status()
            .map_err(|e| http_error("weather api error", e))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| http_error("weather response was not JSON", e))?;

        body.get("current")
            .and_then(|c| c.get("temperature_2m"))
            .and_then(|t| t.as_f64())
            .ok_or_else(|| {
                ToolError::Execution("weather response missing current.temperature_2m".to_string())
            })
    }
}

impl Default for TemperatureTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TemperatureTool {
    fn name(&self) -> &str {
        "fetch_temperature"
    }

    fn description(&self) -> &str {
        "Return the current temperature (°C) for a given location by its coordinates"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "lat": {"type": "number", "description": "The latitude of the location"},
                "lon": {"type": "number", "description": "The longitude of the location"}
            },
            "required": ["lat", "lon"],
            "additionalProperties": false
        })
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let lat = required_f64(&args, "lat")?;
        let lon = required_f64(&args, "lon")?;
        Ok(json!(self.fetch(lat, lon).await?))
    }
}
