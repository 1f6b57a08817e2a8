// ABOUTME: Orchestrator/worker/reviewer pattern for market research reports.
// ABOUTME: The orchestrator plans sections, workers analyze each with earlier findings as context, a reviewer consolidates.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use agentflow_core::structured::{array_of, check_range, properties, strict_object};
use agentflow_core::{ChatMessage, LlmClient, StructuredOutput, complete_structured};

use crate::error::PatternError;

const FIRST_SECTION: &str = "This is the first analysis section";

fn string_list(description: &str) -> Value {
    json!({"type": "array", "items": {"type": "string"}, "description": description})
}

fn text(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTask {
    pub analysis_type: String,
    pub research_focus: String,
    pub methodology: String,
    pub depth_level: String,
}

impl ResearchTask {
    fn schema() -> Value {
        strict_object(
            properties(&[
                ("analysis_type", text("Type of market analysis to conduct")),
                ("research_focus", text("What this analysis should investigate")),
                ("methodology", text("Research approach for this section")),
                ("depth_level", text("Level of detail required (high/medium/low)")),
            ]),
            &["analysis_type", "research_focus", "methodology", "depth_level"],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorPlan {
    pub market_overview: String,
    pub research_objectives: Vec<String>,
    pub target_segments: Vec<String>,
    pub analysis_sections: Vec<ResearchTask>,
}

impl StructuredOutput for OrchestratorPlan {
    const NAME: &'static str = "OrchestratorPlan";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("market_overview", text("High-level market context and scope")),
                ("research_objectives", string_list("Key questions to answer")),
                ("target_segments", string_list("Market segments to analyze")),
                ("analysis_sections", array_of(ResearchTask::schema())),
            ]),
            &[
                "market_overview",
                "research_objectives",
                "target_segments",
                "analysis_sections",
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchFindings {
    pub key_insights: Vec<String>,
    pub data_points: Vec<String>,
    pub analysis_content: String,
    pub recommendations: Vec<String>,
}

impl StructuredOutput for ResearchFindings {
    const NAME: &'static str = "ResearchFindings";

    fn schema() -> Value {
        strict_object(
            properties(&[
                ("key_insights", string_list("Primary insights discovered")),
                ("data_points", string_list("Important metrics and statistics")),
                ("analysis_content", text("Detailed analysis content")),
                ("recommendations", string_list("Actionable recommendations")),
            ]),
            &["key_insights", "data_points", "analysis_content", "recommendations"],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecommendation {
    pub section_name: String,
    pub improvement_suggestions: String,
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReview {
    pub analytical_rigor_score: f64,
    pub insight_coherence_score: f64,
    pub section_improvements: Vec<SectionRecommendation>,
    pub executive_summary: String,
    pub final_report: String,
}

impl StructuredOutput for FinalReview {
    const NAME: &'static str = "FinalReview";

    fn schema() -> Value {
        let recommendation = strict_object(
            properties(&[
                ("section_name", text("Name of the research section")),
                ("improvement_suggestions", text("Suggested improvement")),
                ("priority", text("Priority level: high/medium/low")),
            ]),
            &["section_name", "improvement_suggestions", "priority"],
        );
        strict_object(
            properties(&[
                (
                    "analytical_rigor_score",
                    json!({"type": "number", "description": "Quality of analysis (0-1)"}),
                ),
                (
                    "insight_coherence_score",
                    json!({"type": "number", "description": "How well insights connect (0-1)"}),
                ),
                ("section_improvements", array_of(recommendation)),
                ("executive_summary", text("High-level summary of key findings")),
                ("final_report", text("Complete, polished market research report")),
            ]),
            &[
                "analytical_rigor_score",
                "insight_coherence_score",
                "section_improvements",
                "executive_summary",
                "final_report",
            ],
        )
    }

    fn validate(&self) -> Result<(), String> {
        check_range("analytical_rigor_score", self.analytical_rigor_score, 0.0, 1.0)?;
        check_range("insight_coherence_score", self.insight_coherence_score, 0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchBrief {
    pub market: String,
    pub scope: String,
    pub context: String,
    pub timeline: String,
}

impl ResearchBrief {
    pub fn new(market: &str) -> Self {
        Self {
            market: market.to_string(),
            scope: "comprehensive analysis".to_string(),
            context: "strategic planning".to_string(),
            timeline: "Q1 2025".to_string(),
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = context.to_string();
        self
    }

    pub fn with_timeline(mut self, timeline: &str) -> Self {
        self.timeline = timeline.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchReport {
    pub plan: OrchestratorPlan,
    /// Findings keyed by analysis type, in the order the types first appeared.
    pub findings: Vec<(String, ResearchFindings)>,
    pub review: FinalReview,
}

pub struct MarketResearchOrchestrator {
    client: Arc<dyn LlmClient>,
}

impl MarketResearchOrchestrator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub async fn generate(&self, brief: &ResearchBrief) -> Result<ResearchReport, PatternError> {
        tracing::info!(market = %brief.market, "starting market research");

        let plan = self.plan(brief).await?;
        tracing::info!(sections = plan.analysis_sections.len(), "research plan created");

        let mut findings: Vec<(String, ResearchFindings)> = Vec::new();
        for task in &plan.analysis_sections {
            tracing::info!(analysis = %task.analysis_type, "conducting analysis");
            let result = self.analyze(&brief.market, task, &findings).await?;
            match findings.iter_mut().find(|(kind, _)| *kind == task.analysis_type) {
                Some(slot) => slot.1 = result,
                None => findings.push((task.analysis_type.clone(), result)),
            }
        }

        tracing::info!("reviewing and synthesizing final report");
        let review = self.review(&brief.market, &plan, &findings).await?;

        Ok(ResearchReport {
            plan,
            findings,
            review,
        })
    }

    async fn plan(&self, brief: &ResearchBrief) -> Result<OrchestratorPlan, PatternError> {
        let prompt = format!(
            "Design a comprehensive market research plan for this request:\n\n\
             Market/Industry: {}\n\
             Research Scope: {}\n\
             Business Context: {}\n\
             Timeline: {}\n\n\
             Structure your analysis plan to cover:\n\n\
             # Market overview\n\
             Provide context about the market landscape and define the research boundaries.\n\n\
             # Research objectives\n\
             List 3-5 key questions this research should answer.\n\n\
             # Target segments\n\
             Identify market segments that should be analyzed separately.\n\n\
             # Analysis sections\n\
             Break down into specific research tasks, each with an analysis type, a research focus, \
             a methodology and a depth level (high/medium/low). Typically 4-6 sections covering \
             competitive landscape, market sizing, trends, customer analysis etc.",
            brief.market, brief.scope, brief.context, brief.timeline
        );
        Ok(complete_structured(self.client.as_ref(), vec![ChatMessage::system(prompt)]).await?)
    }

    async fn analyze(
        &self,
        market: &str,
        task: &ResearchTask,
        previous: &[(String, ResearchFindings)],
    ) -> Result<ResearchFindings, PatternError> {
        let previous_findings = previous_context(previous);
        let prompt = format!(
            "Conduct market research analysis based on:\n\n\
             Market: {}\n\
             Analysis Type: {}\n\
             Research Focus: {}\n\
             Methodology: {}\n\
             Depth Level: {}\n\n\
             Previous Research Context:\n{}\n\n\
             Structure your response as key insights, data points (metrics and statistics), \
             detailed analysis content following the methodology and depth level, and actionable recommendations.",
            market,
            task.analysis_type,
            task.research_focus,
            task.methodology,
            task.depth_level,
            previous_findings
        );
        Ok(complete_structured(self.client.as_ref(), vec![ChatMessage::system(prompt)]).await?)
    }

    async fn review(
        &self,
        market: &str,
        plan: &OrchestratorPlan,
        findings: &[(String, ResearchFindings)],
    ) -> Result<FinalReview, PatternError> {
        let sections = findings
            .iter()
            .map(|(kind, f)| {
                format!(
                    "=== {} ===\nInsights: {:?}\nAnalysis: {}\nRecommendations: {:?}",
                    kind, f.key_insights, f.analysis_content, f.recommendations
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Review this market research report for analytical quality and coherence:\n\n\
             Market: {}\n\
             Research Objectives: {:?}\n\n\
             Research Sections:\n{}\n\n\
             Evaluate the report on:\n\
             1. Analytical rigor (methodology, data quality, logical reasoning)\n\
             2. Insight coherence (how well findings connect across sections)\n\
             3. Actionability of recommendations\n\
             4. Overall research quality\n\n\
             Provide scores between 0.0 and 1.0 for analytical rigor and insight coherence. \
             Suggest specific improvements for each section if needed. \
             Create an executive summary highlighting the most important findings. \
             Produce a final polished report that integrates all sections coherently.",
            market, plan.research_objectives, sections
        );
        Ok(complete_structured(self.client.as_ref(), vec![ChatMessage::system(prompt)]).await?)
    }
}

/// Context handed to each worker: the insights and data of every earlier section.
pub fn previous_context(previous: &[(String, ResearchFindings)]) -> String {
    if previous.is_empty() {
        return FIRST_SECTION.to_string();
    }
    previous
        .iter()
        .map(|(kind, f)| {
            format!(
                "=== {} ===\nKey Insights: {:?}\nData: {:?}",
                kind, f.key_insights, f.data_points
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
