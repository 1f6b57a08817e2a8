// ABOUTME: Ready-made crews for the CLI (articles, events, ages) and a stdin-backed human reviewer.
// ABOUTME: Crew definitions live here so the smoke tests and main share the same wiring.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use agentflow_core::structured::{properties, strict_object};
use agentflow_core::{LlmClient, StructuredOutput};
use agentflow_patterns::crew::{
    Agent, Crew, CrewError, CrewInputs, CrewOutput, HumanFeedback, Task, TaskCondition,
};
use agentflow_patterns::tools::SerperSearchTool;

/// The conditional crew keeps collecting until at least this many events exist.
pub const MIN_EVENTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsData {
    pub events: Vec<String>,
}

impl StructuredOutput for EventsData {
    const NAME: &'static str = "EventsData";

    fn schema() -> Value {
        strict_object(
            properties(&[("events", json!({"type": "array", "items": {"type": "string"}}))]),
            &["events"],
        )
    }
}

fn with_search(agent: Agent, search: &Option<Arc<SerperSearchTool>>) -> Agent {
    match search {
        Some(tool) => agent.with_tool(tool.clone()),
        None => agent,
    }
}

/// Researcher and writer; the article goes through a human review.
pub fn articles_crew(
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<SerperSearchTool>>,
    feedback: Arc<dyn HumanFeedback>,
) -> Result<Crew, CrewError> {
    let researcher = with_search(
        Agent::new(
            "Content researcher",
            "Extract key insights about {topic} from the web",
            "You are a skilled researcher who excels at extracting valuable insights from online content. \
             You focus on gathering accurate and relevant information to support your team.",
        ),
        &search,
    );
    let writer = Agent::new(
        "Tech Article Writer",
        "Craft an article based on the research insights",
        "You are an experienced writer known for turning complex information into engaging and accessible \
         articles. Your work makes advanced technology topics understandable to a broad audience.",
    );

    Crew::builder()
        .default_llm(llm)
        .feedback(feedback)
        .agent(researcher)
        .agent(writer)
        .task(Task::new(
            "Research and extract key insights regarding {topic}. Compile your findings in a detailed summary.",
            "A summary of the key insights about {topic}",
            0,
        ))
        .task(
            Task::new(
                "Using the summary provided by the researcher, write a compelling article on {topic}. \
                 Ensure the article is well-structured and engaging for a tech-savvy audience.",
                "A well-written article on {topic} based on the research",
                1,
            )
            .with_human_input(),
        )
        .build()
}

/// Collect events, top them up only when too few came back, then summarize.
pub fn events_crew(
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<SerperSearchTool>>,
) -> Result<Crew, CrewError> {
    let too_few = TaskCondition::new(|previous| {
        previous
            .parsed::<EventsData>()
            .map(|data| data.events.len() < MIN_EVENTS)
            .unwrap_or(true)
    });

    Crew::builder()
        .default_llm(llm)
        .planning(true)
        .agent(with_search(
            Agent::new(
                "Data collector",
                "Retrieve event data using the search tool",
                "You have a knack for finding the most exciting events happening around.",
            ),
            &search,
        ))
        .agent(with_search(
            Agent::new(
                "Data Analyzer",
                "Analyze the collected data",
                "You're known for your analytical skills, making sense of complex datasets.",
            ),
            &search,
        ))
        .agent(Agent::new(
            "Summary Creator",
            "Produce a concise summary from the event data",
            "You're a skilled writer, able to summarize information clearly and effectively.",
        ))
        .task(
            Task::new(
                "Collect event data for {city} using the search tool",
                "A list of 8 exciting events happening in {city} this week",
                0,
            )
            .with_output::<EventsData>(),
        )
        .task(
            Task::new(
                "Ensure that sufficient event data has been collected. \
                 If fewer than 8 events are found, gather more using the search tool.",
                "An updated list of at least 8 events happening in {city} this week",
                1,
            )
            .with_condition(too_few),
        )
        .task(Task::new("Summarize the collected events data for {city}", "Summary generated", 2))
        .build()
}

/// One mathematician, one task, run once per dataset.
pub fn ages_crew(llm: Arc<dyn LlmClient>) -> Result<Crew, CrewError> {
    Crew::builder()
        .default_llm(llm)
        .agent(Agent::new(
            "mathematician",
            "Analyze data and provide insights",
            "You are an experienced mathematician with experience in statistics.",
        ))
        .task(Task::new(
            "Analyze the given dataset and calculate the average age of participants. Ages: {ages}",
            "Provide the dataset first and then the average age of participants",
            0,
        ))
        .build()
}

pub fn ages_datasets() -> Vec<CrewInputs> {
    [
        [25, 30, 35, 40, 45],
        [20, 25, 30, 35, 40],
        [30, 35, 40, 45, 50],
    ]
    .into_iter()
    .map(|ages| CrewInputs::from([("ages".to_string(), json!(ages))]))
    .collect()
}

/// How a crew works through several input sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RunMode {
    /// One kickoff after another.
    #[default]
    Sequential,
    /// All kickoffs awaited together.
    Concurrent,
    /// Each kickoff spawned as its own task, then joined.
    Background,
}

/// Run `crew` once per input set. Outputs keep the order of `inputs_list`.
pub async fn run_for_each(
    crew: Arc<Crew>,
    inputs_list: &[CrewInputs],
    mode: RunMode,
) -> anyhow::Result<Vec<CrewOutput>> {
    tracing::info!(runs = inputs_list.len(), ?mode, "running crew for each input set");
    match mode {
        RunMode::Sequential => Ok(crew.kickoff_for_each(inputs_list).await?),
        RunMode::Concurrent => Ok(crew.kickoff_for_each_concurrent(inputs_list).await?),
        RunMode::Background => {
            let handles: Vec<_> = inputs_list
                .iter()
                .map(|inputs| crew.kickoff_async(inputs.clone()))
                .collect();
            let mut outputs = Vec::with_capacity(handles.len());
            for handle in handles {
                outputs.push(handle.await??);
            }
            Ok(outputs)
        }
    }
}

/// Asks the person at the terminal to review each output. An empty line accepts it.
pub struct StdinFeedback;

#[async_trait]
impl HumanFeedback for StdinFeedback {
    async fn review(&self, task: &str, output: &str) -> Result<String, CrewError> {
        let mut stdout = tokio::io::stdout();
        let banner = format!(
            "\n## Final result of task: {}\n{}\n\n\
             Provide feedback on the result above (press Enter to accept):\n> ",
            task, output
        );
        stdout
            .write_all(banner.as_bytes())
            .await
            .map_err(|e| CrewError::Feedback(e.to_string()))?;
        stdout.flush().await.map_err(|e| CrewError::Feedback(e.to_string()))?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| CrewError::Feedback(e.to_string()))?;
        Ok(line.trim().to_string())
    }
}
