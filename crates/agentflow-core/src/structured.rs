// ABOUTME: Schema-described structured output: request JSON from a model and parse it into validated types.
// ABOUTME: Validation rules (ranges, required fields) live on each type via StructuredOutput::validate.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::message::ChatMessage;
use crate::runtime::{ChatRequest, LlmClient, LlmError, ResponseFormat};

/// A type the model can be asked to produce as JSON.
pub trait StructuredOutput: Serialize + DeserializeOwned + Send {
    /// Schema name sent to the provider.
    const NAME: &'static str;

    fn schema() -> Value;

    /// Post-parse checks that the schema alone cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

pub fn response_format<T: StructuredOutput>() -> ResponseFormat {
    ResponseFormat {
        name: T::NAME.to_string(),
        schema: T::schema(),
    }
}

/// Parse a model reply into `T`, tolerating a surrounding Markdown fence.
pub fn parse_structured<T: StructuredOutput>(text: &str) -> Result<T, LlmError> {
    let body = strip_code_fence(text);
    let value: T = serde_json::from_str(body).map_err(|e| {
        LlmError::Structured(format!("{}: could not parse reply as JSON: {}", T::NAME, e))
    })?;
    value
        .validate()
        .map_err(|e| LlmError::Structured(format!("{}: {}", T::NAME, e)))?;
    Ok(value)
}

/// Send `messages` with a schema attached and parse the reply into `T`.
pub async fn complete_structured<T: StructuredOutput>(
    client: &dyn LlmClient,
    messages: Vec<ChatMessage>,
) -> Result<T, LlmError> {
    let request = ChatRequest::new(messages).with_response_format(response_format::<T>());
    let response = client.complete(&request).await?;
    tracing::debug!(schema = T::NAME, "structured reply received");
    parse_structured(response.text())
}

/// Strip a leading ```json / ``` fence and its closing fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// JSON schema for an object where every listed property is required and
/// nothing else is allowed, the shape strict structured output expects.
pub fn strict_object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Schema for an array of strict objects.
pub fn array_of(items: Value) -> Value {
    json!({"type": "array", "items": items})
}

/// Inclusive range check used by validate() implementations.
pub fn check_range<N>(field: &str, value: N, min: N, max: N) -> Result<(), String>
where
    N: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        ));
    }
    Ok(())
}

/// Convenience for building a `properties` map in schema helpers.
pub fn properties(entries: &[(&str, Value)]) -> Value {
    let mut map = Map::new();
    for (name, schema) in entries {
        map.insert((*name).to_string(), schema.clone());
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlmClient;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Score {
        label: String,
        confidence: f64,
    }

    impl StructuredOutput for Score {
        const NAME: &'static str = "Score";

        fn schema() -> Value {
            strict_object(
                properties(&[
                    ("label", json!({"type": "string"})),
                    ("confidence", json!({"type": "number"})),
                ]),
                &["label", "confidence"],
            )
        }

        fn validate(&self) -> Result<(), String> {
            check_range("confidence", self.confidence, 0.0, 1.0)
        }
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  ```\n{\"a\":1}```  "), "{\"a\":1}");
    }

    #[test]
    fn parse_structured_accepts_fenced_json() {
        let parsed: Score =
            parse_structured("```json\n{\"label\": \"ok\", \"confidence\": 0.9}\n```").unwrap();
        assert_eq!(parsed.label, "ok");
    }

    #[test]
    fn parse_structured_rejects_out_of_range() {
        let err = parse_structured::<Score>("{\"label\": \"ok\", \"confidence\": 1.5}").unwrap_err();
        match err {
            LlmError::Structured(msg) => {
                assert!(msg.contains("confidence must be between 0 and 1"));
                assert!(msg.starts_with("Score"));
            }
            other => panic!("expected Structured, got {:?}", other),
        }
    }

    #[test]
    fn parse_structured_rejects_missing_field() {
        let err = parse_structured::<Score>("{\"label\": \"ok\"}").unwrap_err();
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn strict_object_shape() {
        let schema = Score::schema();
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["required"], json!(["label", "confidence"]));
    }

    #[tokio::test]
    async fn complete_structured_attaches_schema() {
        let client = ScriptedLlmClient::new()
            .json(json!({"label": "support", "confidence": 0.8}));

        let score: Score = complete_structured(&client, vec![ChatMessage::user("classify")])
            .await
            .unwrap();
        assert_eq!(score.label, "support");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let format = requests[0].response_format.as_ref().unwrap();
        assert_eq!(format.name, "Score");
    }
}
