// ABOUTME: Single-shot structured extraction plus the small schemas the CLI demos extract.
// ABOUTME: CourseFeedback parses free-form reviews; KnowledgeBaseAnswer cites a knowledge-base record.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use agentflow_core::structured::{check_range, properties, strict_object};
use agentflow_core::{ChatMessage, LlmClient, StructuredOutput, complete_structured};

use crate::error::PatternError;

pub const FEEDBACK_PROMPT: &str = "You are a helpful assistant that processes user feedback";

/// Ask the model for one `T` given a system and a user prompt.
pub async fn extract<T>(client: &dyn LlmClient, system: &str, user: &str) -> Result<T, PatternError>
where
    T: StructuredOutput + DeserializeOwned,
{
    Ok(complete_structured(client, vec![ChatMessage::system(system), ChatMessage::user(user)]).await?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseFeedback {
    pub sentiment: String,
    pub completed_courses: i64,
    pub would_recommend: bool,
}

impl StructuredOutput for CourseFeedback {
    const NAME: &'static str = "CourseFeedback";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("sentiment", json!({"type": "string"})),
                ("completed_courses", json!({"type": "integer"})),
                ("would_recommend", json!({"type": "boolean"})),
            ]),
            &["sentiment", "completed_courses", "would_recommend"],
        )
    }

    fn validate(&self) -> Result<(), String> {
        check_range("completed_courses", self.completed_courses, 0, i64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseAnswer {
    pub answer: String,
    pub source: i64,
}

impl StructuredOutput for KnowledgeBaseAnswer {
    const NAME: &'static str = "KnowledgeBaseAnswer";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("answer", json!({"type": "string", "description": "The answer to the user's question."})),
                ("source", json!({"type": "integer", "description": "The record id of the answer"})),
            ]),
            &["answer", "source"],
        )
    }
}
