// ABOUTME: Crew runner: agents (persona + tools + model) execute tasks in sequence, sharing earlier outputs as context.
// ABOUTME: Supports input interpolation, conditional tasks, an up-front plan, and human review of task output.

pub mod agent;
pub mod runner;
pub mod task;

pub use agent::Agent;
pub use runner::{Crew, CrewBuilder, CrewOutput, HumanFeedback, Process};
pub use task::{Task, TaskCondition, TaskOutput};

use std::collections::HashMap;

use serde_json::Value;

use agentflow_core::LlmError;

/// Values substituted into `{name}` placeholders.
pub type CrewInputs = HashMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum CrewError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("missing input for placeholder {{{0}}}")]
    MissingInput(String),

    #[error("invalid crew: {0}")]
    InvalidCrew(String),

    #[error("human feedback failed: {0}")]
    Feedback(String),
}

/// Replace `{name}` placeholders with values from `inputs`. Strings are
/// inserted raw, anything else as compact JSON. Braces that do not wrap an
/// identifier are left untouched.
pub fn interpolate(template: &str, inputs: &CrewInputs) -> Result<String, CrewError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let placeholder = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|name| is_identifier(name));

        match placeholder {
            Some(name) => {
                let value = inputs
                    .get(name)
                    .ok_or_else(|| CrewError::MissingInput(name.to_string()))?;
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> CrewInputs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn interpolates_strings_and_json() {
        let vars = inputs(&[("topic", json!("AI in healthcare")), ("ages", json!([25, 30, 35]))]);
        let text = interpolate("Research {topic}. Ages: {ages}", &vars).unwrap();
        assert_eq!(text, "Research AI in healthcare. Ages: [25,30,35]");
    }

    #[test]
    fn non_identifier_braces_are_literal() {
        let text = interpolate("Return {\"events\": []} or { } or {1abc}", &CrewInputs::new()).unwrap();
        assert_eq!(text, "Return {\"events\": []} or { } or {1abc}");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let err = interpolate("Goal: {topic}", &CrewInputs::new()).unwrap_err();
        assert!(matches!(err, CrewError::MissingInput(ref n) if n == "topic"));
        assert_eq!(err.to_string(), "missing input for placeholder {topic}");
    }

    #[test]
    fn empty_string_input_is_allowed() {
        let vars = inputs(&[("topic", json!(""))]);
        assert_eq!(interpolate("about {topic}!", &vars).unwrap(), "about !");
    }

    #[test]
    fn unclosed_brace_is_literal() {
        assert_eq!(interpolate("open {brace", &CrewInputs::new()).unwrap(), "open {brace");
    }
}
