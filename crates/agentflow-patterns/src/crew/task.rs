// ABOUTME: Crew tasks and their outputs, including conditional tasks gated on the previous output.
// ABOUTME: A task may request JSON output matching a schema and may require human review.

use std::sync::Arc;

use serde_json::Value;

use agentflow_core::{ResponseFormat, StructuredOutput, response_format};

/// Predicate over the previous executed task's output.
#[derive(Clone)]
pub struct TaskCondition(Arc<dyn Fn(&TaskOutput) -> bool + Send + Sync>);

impl TaskCondition {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&TaskOutput) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn evaluate(&self, previous: &TaskOutput) -> bool {
        (self.0)(previous)
    }
}

impl std::fmt::Debug for TaskCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TaskCondition(..)")
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub description: String,
    pub expected_output: String,
    /// Index into the crew's agent list.
    pub agent: usize,
    pub output_schema: Option<ResponseFormat>,
    pub condition: Option<TaskCondition>,
    pub human_input: bool,
}

impl Task {
    pub fn new(description: &str, expected_output: &str, agent: usize) -> Self {
        Self {
            description: description.to_string(),
            expected_output: expected_output.to_string(),
            agent,
            output_schema: None,
            condition: None,
            human_input: false,
        }
    }

    pub fn with_output<T: StructuredOutput>(mut self) -> Self {
        self.output_schema = Some(response_format::<T>());
        self
    }

    pub fn with_condition(mut self, condition: TaskCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_human_input(mut self) -> Self {
        self.human_input = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub description: String,
    pub agent_role: String,
    pub raw: String,
    /// Parsed output when the task requested a schema.
    pub json: Option<Value>,
    pub skipped: bool,
}

impl TaskOutput {
    /// Decode the JSON output into a concrete type.
    pub fn parsed<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.json
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(json: Option<Value>) -> TaskOutput {
        TaskOutput {
            description: "fetch".to_string(),
            agent_role: "Data collector".to_string(),
            raw: String::new(),
            json,
            skipped: false,
        }
    }

    #[test]
    fn condition_reads_previous_output() {
        let fewer_than_two = TaskCondition::new(|prev| {
            prev.json
                .as_ref()
                .and_then(|j| j["events"].as_array())
                .map(|e| e.len() < 2)
                .unwrap_or(true)
        });

        assert!(fewer_than_two.evaluate(&output(Some(json!({"events": ["a"]})))));
        assert!(!fewer_than_two.evaluate(&output(Some(json!({"events": ["a", "b"]})))));
        assert!(fewer_than_two.evaluate(&output(None)));
    }

    #[test]
    fn parsed_decodes_json() {
        let out = output(Some(json!([1, 2, 3])));
        let nums: Vec<i32> = out.parsed().unwrap();
        assert_eq!(nums, vec![1, 2, 3]);
        assert!(output(None).parsed::<Vec<i32>>().is_none());
    }
}
