// ABOUTME: Evaluator-optimizer translation loop: translate, score, improve until the score clears a threshold.
// ABOUTME: Every run returns a TranslationReport with the per-iteration history, whether or not the bar was met.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use agentflow_core::structured::{array_of, check_range, properties, strict_object};
use agentflow_core::{ChatMessage, LlmClient, StructuredOutput, complete_structured};

use crate::error::PatternError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub translated_text: String,
    pub reasoning: String,
}

impl StructuredOutput for TranslationResponse {
    const NAME: &'static str = "TranslationResponse";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("translated_text", json!({"type": "string", "description": "The translated text"})),
                (
                    "reasoning",
                    json!({"type": "string", "description": "Brief explanation of translation choices made"}),
                ),
            ]),
            &["translated_text", "reasoning"],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriteria {
    pub accuracy: i64,
    pub fluency: i64,
    pub cultural_appropriateness: i64,
    pub style_preservation: i64,
}

impl EvaluationCriteria {
    fn schema() -> Value {
        let score = |desc: &str| json!({"type": "integer", "description": format!("{} (1-10 scale)", desc)});
        strict_object(
            properties(&[
                ("accuracy", score("Accuracy of translation")),
                ("fluency", score("Natural flow in target language")),
                ("cultural_appropriateness", score("Cultural context preservation")),
                ("style_preservation", score("Preservation of original style/tone")),
            ]),
            &["accuracy", "fluency", "cultural_appropriateness", "style_preservation"],
        )
    }

    fn validate(&self) -> Result<(), String> {
        check_range("accuracy", self.accuracy, 1, 10)?;
        check_range("fluency", self.fluency, 1, 10)?;
        check_range("cultural_appropriateness", self.cultural_appropriateness, 1, 10)?;
        check_range("style_preservation", self.style_preservation, 1, 10)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationEvaluation {
    pub overall_score: f64,
    pub criteria_scores: EvaluationCriteria,
    pub specific_feedback: Vec<String>,
    pub is_satisfactory: bool,
    pub confidence: f64,
}

impl StructuredOutput for TranslationEvaluation {
    const NAME: &'static str = "TranslationEvaluation";

    fn schema() -> Value {
        strict_object(
            properties(&[
                (
                    "overall_score",
                    json!({"type": "number", "description": "Overall quality score (1-10 scale)"}),
                ),
                ("criteria_scores", EvaluationCriteria::schema()),
                (
                    "specific_feedback",
                    json!({
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Specific areas for improvement"
                    }),
                ),
                (
                    "is_satisfactory",
                    json!({"type": "boolean", "description": "Whether translation meets quality threshold"}),
                ),
                (
                    "confidence",
                    json!({"type": "number", "description": "Evaluator's confidence in assessment (0-1)"}),
                ),
            ]),
            &[
                "overall_score",
                "criteria_scores",
                "specific_feedback",
                "is_satisfactory",
                "confidence",
            ],
        )
    }

    fn validate(&self) -> Result<(), String> {
        check_range("overall_score", self.overall_score, 1.0, 10.0)?;
        check_range("confidence", self.confidence, 0.0, 1.0)?;
        self.criteria_scores.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedTranslation {
    pub improved_text: String,
    pub changes_made: Vec<String>,
    pub reasoning: String,
}

impl StructuredOutput for OptimizedTranslation {
    const NAME: &'static str = "OptimizedTranslation";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("improved_text", json!({"type": "string", "description": "The improved translation"})),
                (
                    "changes_made",
                    array_of(json!({"type": "string"})),
                ),
                (
                    "reasoning",
                    json!({"type": "string", "description": "Explanation of how feedback was addressed"}),
                ),
            ]),
            &["improved_text", "changes_made", "reasoning"],
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationSettings {
    pub source_language: String,
    pub target_language: String,
    pub max_iterations: usize,
    pub quality_threshold: f64,
}

impl TranslationSettings {
    pub fn new(target_language: &str) -> Self {
        Self {
            source_language: "English".to_string(),
            target_language: target_language.to_string(),
            max_iterations: 3,
            quality_threshold: 7.0,
        }
    }

    pub fn from_language(mut self, source_language: &str) -> Self {
        self.source_language = source_language.to_string();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub translation: String,
    pub evaluation: TranslationEvaluation,
    pub optimization: Option<OptimizedTranslation>,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationReport {
    pub final_translation: String,
    pub final_score: f64,
    pub total_iterations: usize,
    pub threshold_met: bool,
    pub iterations: Vec<IterationRecord>,
}

pub struct TranslationLoop {
    client: Arc<dyn LlmClient>,
    settings: TranslationSettings,
}

impl TranslationLoop {
    pub fn new(client: Arc<dyn LlmClient>, settings: TranslationSettings) -> Self {
        Self { client, settings }
    }

    pub async fn run(&self, source_text: &str) -> Result<TranslationReport, PatternError> {
        let s = &self.settings;
        if s.max_iterations == 0 {
            return Err(PatternError::InvalidSettings(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        tracing::info!(
            source = %s.source_language,
            target = %s.target_language,
            max_iterations = s.max_iterations,
            threshold = s.quality_threshold,
            "starting evaluator-optimizer translation"
        );

        let mut current = self.translate(source_text).await?;
        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut threshold_met = false;

        for iteration in 1..=s.max_iterations {
            tracing::info!(iteration, "evaluating translation");
            let evaluation = self.evaluate(source_text, &current).await?;

            if evaluation.is_satisfactory && evaluation.overall_score >= s.quality_threshold {
                tracing::info!(score = evaluation.overall_score, "quality threshold met");
                iterations.push(IterationRecord {
                    iteration,
                    translation: current.clone(),
                    evaluation,
                    optimization: None,
                    is_final: true,
                });
                threshold_met = true;
                break;
            }

            let optimization = if iteration < s.max_iterations {
                tracing::info!(score = evaluation.overall_score, "below threshold, optimizing");
                Some(self.optimize(source_text, &current, &evaluation).await?)
            } else {
                None
            };

            iterations.push(IterationRecord {
                iteration,
                translation: current.clone(),
                evaluation,
                optimization: optimization.clone(),
                is_final: false,
            });

            if let Some(opt) = optimization {
                current = opt.improved_text;
            }
        }

        let last = iterations.last().ok_or_else(|| {
            PatternError::InvalidSettings("translation loop produced no iterations".to_string())
        })?;

        Ok(TranslationReport {
            final_translation: last.translation.clone(),
            final_score: last.evaluation.overall_score,
            total_iterations: iterations.len(),
            threshold_met,
            iterations,
        })
    }

    async fn translate(&self, source_text: &str) -> Result<String, PatternError> {
        let s = &self.settings;
        let system = format!(
            "You are an expert translator specializing in {src} to {dst} translation. \
             Your goal is to create accurate, fluent translations that preserve the original meaning, style, and cultural context. \
             Pay attention to:\n\
             - Accuracy of meaning\n\
             - Natural flow in the target language\n\
             - Cultural appropriateness\n\
             - Preservation of original tone and style\n\n\
             Provide your translation along with brief reasoning for your choices.",
            src = s.source_language,
            dst = s.target_language
        );
        let user = format!(
            "Please translate the following {} text to {}:\n\n{}",
            s.source_language, s.target_language, source_text
        );

        let response: TranslationResponse = complete_structured(
            self.client.as_ref(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
        .await?;
        tracing::info!("initial translation generated");
        Ok(response.translated_text)
    }

    async fn evaluate(
        &self,
        source_text: &str,
        translation: &str,
    ) -> Result<TranslationEvaluation, PatternError> {
        let s = &self.settings;
        let system = format!(
            "You are a critical translation evaluator with expertise in both {src} and {dst}. \
             Evaluate translations based on:\n\
             1. Accuracy: How well does it convey the original meaning?\n\
             2. Fluency: How natural does it sound in {dst}?\n\
             3. Cultural appropriateness: Are cultural nuances properly handled?\n\
             4. Style preservation: Is the original tone/style maintained?\n\n\
             Be thorough and constructive in your feedback. A translation is satisfactory only if it scores 7+ overall. \
             Provide specific, actionable feedback for improvements.",
            src = s.source_language,
            dst = s.target_language
        );
        let user = format!(
            "Please evaluate this translation:\n\n\
             Original ({}): {}\n\n\
             Translation ({}): {}\n\n\
             Provide detailed scoring and specific feedback for improvement.",
            s.source_language, source_text, s.target_language, translation
        );

        let evaluation: TranslationEvaluation = complete_structured(
            self.client.as_ref(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
        .await?;

        tracing::info!(
            score = evaluation.overall_score,
            satisfactory = evaluation.is_satisfactory,
            "translation evaluated"
        );
        if !evaluation.is_satisfactory {
            let top: Vec<&str> = evaluation
                .specific_feedback
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            tracing::info!(feedback = %top.join(", "), "key feedback areas");
        }
        Ok(evaluation)
    }

    async fn optimize(
        &self,
        source_text: &str,
        translation: &str,
        evaluation: &TranslationEvaluation,
    ) -> Result<OptimizedTranslation, PatternError> {
        let s = &self.settings;
        let feedback = evaluation
            .specific_feedback
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!(
            "Please improve this translation.\n\n\
             Original ({}): {}\n\n\
             Current Translation ({}): {}\n\n\
             Evaluation Feedback:\n\
             Overall score: {}/10\n\
             Specific issues:\n{}\n\n\
             Please provide an improved version that addresses these specific concerns.",
            s.source_language,
            source_text,
            s.target_language,
            translation,
            evaluation.overall_score,
            feedback
        );

        let optimized: OptimizedTranslation = complete_structured(
            self.client.as_ref(),
            vec![
                ChatMessage::system(
                    "You are an expert translator tasked with improving a translation based on evaluation feedback. \
                     Address the specific issues raised while maintaining the strengths of the current translation. \
                     Focus on making targeted improvements rather than completely rewriting.",
                ),
                ChatMessage::user(user),
            ],
        )
        .await?;
        tracing::info!(changes = optimized.changes_made.len(), "translation optimized");
        Ok(optimized)
    }
}
