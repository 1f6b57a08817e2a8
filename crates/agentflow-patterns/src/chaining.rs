// ABOUTME: Prompt chain with a validation gate: outline a topic, validate the outline, then write the document.
// ABOUTME: A rejected outline stops the chain before the final (most expensive) call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use agentflow_core::structured::{check_range, properties, strict_object};
use agentflow_core::{ChatMessage, LlmClient, StructuredOutput, complete_structured};

use crate::error::PatternError;

pub const DEFAULT_GATE_THRESHOLD: f64 = 0.8;

const OUTLINE_PROMPT: &str = "You're an expert content strategist. \
Create a logical and comprehensive outline for a document on the given topic. \
The outline should include an introduction, several body sections, and a conclusion.";

const VALIDATOR_PROMPT: &str = "You are a critical quality assurance editor. Your primary goal is to REJECT \
low-quality or vague outlines. An outline is considered invalid if the original topic is too vague, \
ambiguous or lacks a clear focus (e.g. 'stuff', 'things', 'an article'). \
Be strict. If the topic is bad, the outline is bad. Provide a brief reason for your decision.";

const AUTHOR_PROMPT: &str = "You are a skilled author. \
Write a comprehensive, well-structured document based on the provided outline. \
Include an engaging title, clear section headings, and a concise conclusion.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutline {
    pub topic: String,
    pub sections: Vec<String>,
}

impl StructuredOutput for DocumentOutline {
    const NAME: &'static str = "DocumentOutline";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("topic", json!({"type": "string", "description": "The main topic of the document"})),
                (
                    "sections",
                    json!({
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "A list of section titles for the document outline"
                    }),
                ),
            ]),
            &["topic", "sections"],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineValidation {
    pub is_valid: bool,
    pub reasoning: String,
    pub confidence_score: f64,
}

impl StructuredOutput for OutlineValidation {
    const NAME: &'static str = "OutlineValidation";

    fn schema() -> Value {
        strict_object(
            properties(&[
                (
                    "is_valid",
                    json!({
                        "type": "boolean",
                        "description": "Whether the outline is logical, comprehensive, and well-structured"
                    }),
                ),
                (
                    "reasoning",
                    json!({
                        "type": "string",
                        "description": "A brief explanation for why the outline is or is not valid"
                    }),
                ),
                (
                    "confidence_score",
                    json!({
                        "type": "number",
                        "description": "Confidence score between 0 and 1 on the validity of the outline"
                    }),
                ),
            ]),
            &["is_valid", "reasoning", "confidence_score"],
        )
    }

    fn validate(&self) -> Result<(), String> {
        check_range("confidence_score", self.confidence_score, 0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDocument {
    pub title: String,
    pub full_content: String,
}

impl StructuredOutput for FinalDocument {
    const NAME: &'static str = "FinalDocument";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("title", json!({"type": "string", "description": "A suitable title for the final document"})),
                (
                    "full_content",
                    json!({
                        "type": "string",
                        "description": "The complete, well-written content of the document, based on the provided outline"
                    }),
                ),
            ]),
            &["title", "full_content"],
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    Completed {
        outline: DocumentOutline,
        validation: OutlineValidation,
        document: FinalDocument,
    },
    Rejected {
        outline: DocumentOutline,
        validation: OutlineValidation,
    },
}

impl ChainOutcome {
    pub fn document(&self) -> Option<&FinalDocument> {
        match self {
            ChainOutcome::Completed { document, .. } => Some(document),
            ChainOutcome::Rejected { .. } => None,
        }
    }

    pub fn validation(&self) -> &OutlineValidation {
        match self {
            ChainOutcome::Completed { validation, .. } | ChainOutcome::Rejected { validation, .. } => {
                validation
            }
        }
    }
}

/// Three-step document chain gated on the validator's verdict.
pub struct DocumentChain {
    client: Arc<dyn LlmClient>,
    gate_threshold: f64,
}

impl DocumentChain {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            gate_threshold: DEFAULT_GATE_THRESHOLD,
        }
    }

    pub fn with_gate_threshold(mut self, threshold: f64) -> Self {
        self.gate_threshold = threshold;
        self
    }

    pub fn gate_passes(&self, validation: &OutlineValidation) -> bool {
        validation.is_valid && validation.confidence_score >= self.gate_threshold
    }

    pub async fn run(&self, topic: &str) -> Result<ChainOutcome, PatternError> {
        tracing::info!(topic, "starting document creation");

        let outline = self.generate_outline(topic).await?;
        let validation = self.validate_outline(&outline).await?;

        if !self.gate_passes(&validation) {
            tracing::warn!(
                confidence = validation.confidence_score,
                reasoning = %validation.reasoning,
                "gate check failed: outline not valid or confidence too low"
            );
            return Ok(ChainOutcome::Rejected {
                outline,
                validation,
            });
        }

        tracing::info!("gate check passed, generating final document");
        let document = self.write_document(&outline).await?;
        tracing::info!(title = %document.title, "document creation completed");

        Ok(ChainOutcome::Completed {
            outline,
            validation,
            document,
        })
    }

    async fn generate_outline(&self, topic: &str) -> Result<DocumentOutline, PatternError> {
        let outline: DocumentOutline = complete_structured(
            self.client.as_ref(),
            vec![ChatMessage::system(OUTLINE_PROMPT), ChatMessage::user(topic)],
        )
        .await?;
        tracing::info!(sections = outline.sections.len(), "outline generated");
        Ok(outline)
    }

    async fn validate_outline(
        &self,
        outline: &DocumentOutline,
    ) -> Result<OutlineValidation, PatternError> {
        let validation: OutlineValidation = complete_structured(
            self.client.as_ref(),
            vec![
                ChatMessage::system(VALIDATOR_PROMPT),
                ChatMessage::user(json!(outline).to_string()),
            ],
        )
        .await?;
        tracing::info!(
            is_valid = validation.is_valid,
            confidence = validation.confidence_score,
            "outline validated"
        );
        Ok(validation)
    }

    async fn write_document(&self, outline: &DocumentOutline) -> Result<FinalDocument, PatternError> {
        Ok(complete_structured(
            self.client.as_ref(),
            vec![
                ChatMessage::system(AUTHOR_PROMPT),
                ChatMessage::user(json!(outline).to_string()),
            ],
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::LlmError;
    use agentflow_core::testing::ScriptedLlmClient;

    fn outline() -> Value {
        json!({
            "topic": "Remote work for small businesses",
            "sections": ["Introduction", "Cost savings", "Hiring reach", "Conclusion"]
        })
    }

    #[tokio::test]
    async fn passing_gate_runs_all_three_calls() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .json(outline())
                .json(json!({"is_valid": true, "reasoning": "Focused topic", "confidence_score": 0.92}))
                .json(json!({"title": "Working Apart, Growing Together", "full_content": "..."})),
        );

        let outcome = DocumentChain::new(client.clone())
            .run("The benefits of remote work for small businesses")
            .await
            .unwrap();

        match &outcome {
            ChainOutcome::Completed { document, outline, .. } => {
                assert_eq!(document.title, "Working Apart, Growing Together");
                assert_eq!(outline.sections.len(), 4);
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[0].response_format.as_ref().unwrap().name,
            "DocumentOutline"
        );
        // The validator sees the outline as JSON.
        assert!(requests[1].messages[1].content.contains("Cost savings"));
        assert_eq!(
            requests[2].response_format.as_ref().unwrap().name,
            "FinalDocument"
        );
    }

    #[tokio::test]
    async fn low_confidence_stops_before_writing() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .json(outline())
                .json(json!({"is_valid": true, "reasoning": "Somewhat vague", "confidence_score": 0.79})),
        );

        let outcome = DocumentChain::new(client.clone()).run("stuff").await.unwrap();

        assert!(matches!(outcome, ChainOutcome::Rejected { .. }));
        assert!(outcome.document().is_none());
        assert_eq!(outcome.validation().confidence_score, 0.79);
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn invalid_outline_stops_even_with_high_confidence() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .json(outline())
                .json(json!({"is_valid": false, "reasoning": "Topic is vague", "confidence_score": 0.99})),
        );

        let outcome = DocumentChain::new(client.clone()).run("things").await.unwrap();
        assert!(matches!(outcome, ChainOutcome::Rejected { .. }));
        assert_eq!(client.remaining(), 0);
    }

    #[test]
    fn gate_threshold_is_inclusive_and_configurable() {
        let chain = DocumentChain::new(Arc::new(ScriptedLlmClient::new()));
        let at_threshold = OutlineValidation {
            is_valid: true,
            reasoning: String::new(),
            confidence_score: 0.8,
        };
        assert!(chain.gate_passes(&at_threshold));

        let strict = DocumentChain::new(Arc::new(ScriptedLlmClient::new())).with_gate_threshold(0.9);
        assert!(!strict.gate_passes(&at_threshold));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_a_structured_error() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .json(outline())
                .json(json!({"is_valid": true, "reasoning": "ok", "confidence_score": 7})),
        );

        let err = DocumentChain::new(client).run("topic").await.unwrap_err();
        assert!(matches!(err, PatternError::Llm(LlmError::Structured(_))));
    }
}
