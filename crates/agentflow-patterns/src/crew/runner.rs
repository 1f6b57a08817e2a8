// ABOUTME: Sequential crew runner: validates the crew, plans (optionally), then executes each task in order.
// ABOUTME: Provides kickoff, kickoff_for_each (sequential and concurrent) and kickoff_async on an Arc<Crew>.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use agentflow_core::structured::{array_of, parse_structured, properties, strict_object, strip_code_fence};
use agentflow_core::{
    ChatMessage, ChatRequest, LlmClient, LlmError, ResponseFormat, StructuredOutput, run_tool_loop,
};

use super::agent::Agent;
use super::task::{Task, TaskOutput};
use super::{CrewError, CrewInputs, interpolate};

/// Revision rounds allowed per task when a reviewer keeps asking for changes.
pub const MAX_FEEDBACK_ROUNDS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Process {
    #[default]
    Sequential,
}

/// Reviews a task's output. An empty (or whitespace) reply accepts it;
/// anything else is sent back to the agent as revision notes.
#[async_trait]
pub trait HumanFeedback: Send + Sync {
    async fn review(&self, task: &str, output: &str) -> Result<String, CrewError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrewOutput {
    pub tasks_output: Vec<TaskOutput>,
    /// Text of the last task that actually ran.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PlanStep {
    task_number: usize,
    plan: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CrewPlan {
    steps: Vec<PlanStep>,
}

impl StructuredOutput for CrewPlan {
    const NAME: &'static str = "CrewPlan";

    fn schema() -> Value {
        strict_object(
            properties(&[(
                "steps",
                array_of(strict_object(
                    properties(&[
                        ("task_number", json!({"type": "integer"})),
                        ("plan", json!({"type": "string"})),
                    ]),
                    &["task_number", "plan"],
                )),
            )]),
            &["steps"],
        )
    }
}

#[derive(Default)]
pub struct CrewBuilder {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    process: Process,
    planning: bool,
    default_llm: Option<Arc<dyn LlmClient>>,
    feedback: Option<Arc<dyn HumanFeedback>>,
}

impl CrewBuilder {
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    pub fn planning(mut self, planning: bool) -> Self {
        self.planning = planning;
        self
    }

    pub fn default_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.default_llm = Some(llm);
        self
    }

    pub fn feedback(mut self, feedback: Arc<dyn HumanFeedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn build(self) -> Result<Crew, CrewError> {
        if self.tasks.is_empty() {
            return Err(CrewError::InvalidCrew("a crew needs at least one task".to_string()));
        }

        for (i, task) in self.tasks.iter().enumerate() {
            let agent = self.agents.get(task.agent).ok_or_else(|| {
                CrewError::InvalidCrew(format!(
                    "task {} refers to agent {} but the crew has {} agents",
                    i + 1,
                    task.agent,
                    self.agents.len()
                ))
            })?;
            if agent.llm.is_none() && self.default_llm.is_none() {
                return Err(CrewError::InvalidCrew(format!(
                    "agent '{}' has no model and the crew has no default model",
                    agent.role
                )));
            }
            if i == 0 && task.condition.is_some() {
                return Err(CrewError::InvalidCrew(
                    "the first task cannot be conditional".to_string(),
                ));
            }
            if task.human_input && self.feedback.is_none() {
                return Err(CrewError::InvalidCrew(format!(
                    "task {} needs human input but no feedback handler is configured",
                    i + 1
                )));
            }
        }

        if self.planning && self.default_llm.is_none() {
            return Err(CrewError::InvalidCrew(
                "planning needs a crew default model".to_string(),
            ));
        }

        Ok(Crew {
            agents: self.agents,
            tasks: self.tasks,
            process: self.process,
            planning: self.planning,
            default_llm: self.default_llm,
            feedback: self.feedback,
        })
    }
}

pub struct Crew {
    agents: Vec<Agent>,
    tasks: Vec<Task>,
    process: Process,
    planning: bool,
    default_llm: Option<Arc<dyn LlmClient>>,
    feedback: Option<Arc<dyn HumanFeedback>>,
}

impl Crew {
    pub fn builder() -> CrewBuilder {
        CrewBuilder::default()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn process(&self) -> Process {
        self.process
    }

    pub async fn kickoff(&self, inputs: &CrewInputs) -> Result<CrewOutput, CrewError> {
        // Interpolate everything first so a missing input fails before any model call.
        let agents = self
            .agents
            .iter()
            .map(|a| {
                let mut agent = a.clone();
                agent.role = interpolate(&a.role, inputs)?;
                agent.goal = interpolate(&a.goal, inputs)?;
                agent.backstory = interpolate(&a.backstory, inputs)?;
                Ok(agent)
            })
            .collect::<Result<Vec<Agent>, CrewError>>()?;
        let tasks = self
            .tasks
            .iter()
            .map(|t| {
                let mut task = t.clone();
                task.description = interpolate(&t.description, inputs)?;
                task.expected_output = interpolate(&t.expected_output, inputs)?;
                Ok(task)
            })
            .collect::<Result<Vec<Task>, CrewError>>()?;

        let plan = if self.planning {
            Some(self.plan(&agents, &tasks).await?)
        } else {
            None
        };

        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(tasks.len());

        for (i, task) in tasks.iter().enumerate() {
            let agent = &agents[task.agent];

            if let Some(condition) = &task.condition {
                let previous = outputs.iter().rev().find(|o| !o.skipped);
                if let Some(prev) = previous
                    && !condition.evaluate(prev)
                {
                    tracing::info!(task = i + 1, "condition not met, skipping task");
                    outputs.push(TaskOutput {
                        description: task.description.clone(),
                        agent_role: agent.role.clone(),
                        raw: String::new(),
                        json: None,
                        skipped: true,
                    });
                    continue;
                }
            }

            tracing::info!(task = i + 1, agent = %agent.role, "executing task");
            let plan_step = plan.as_ref().and_then(|p| {
                p.steps
                    .iter()
                    .find(|s| s.task_number == i + 1)
                    .map(|s| s.plan.as_str())
            });
            let output = self.execute(agent, task, &outputs, plan_step).await?;
            outputs.push(output);
        }

        let raw = outputs
            .iter()
            .rev()
            .find(|o| !o.skipped)
            .map(|o| o.raw.clone())
            .unwrap_or_default();

        Ok(CrewOutput {
            tasks_output: outputs,
            raw,
        })
    }

    /// Run the crew once per input set, one after another.
    pub async fn kickoff_for_each(
        &self,
        inputs_list: &[CrewInputs],
    ) -> Result<Vec<CrewOutput>, CrewError> {
        let mut results = Vec::with_capacity(inputs_list.len());
        for inputs in inputs_list {
            results.push(self.kickoff(inputs).await?);
        }
        Ok(results)
    }

    /// Run the crew once per input set, all at the same time.
    pub async fn kickoff_for_each_concurrent(
        &self,
        inputs_list: &[CrewInputs],
    ) -> Result<Vec<CrewOutput>, CrewError> {
        futures::future::join_all(inputs_list.iter().map(|inputs| self.kickoff(inputs)))
            .await
            .into_iter()
            .collect()
    }

    /// Start a kickoff on the runtime and return immediately.
    pub fn kickoff_async(
        self: &Arc<Self>,
        inputs: CrewInputs,
    ) -> tokio::task::JoinHandle<Result<CrewOutput, CrewError>> {
        let crew = Arc::clone(self);
        tokio::spawn(async move { crew.kickoff(&inputs).await })
    }

    fn llm_for(&self, agent: &Agent) -> Result<Arc<dyn LlmClient>, CrewError> {
        agent
            .llm
            .clone()
            .or_else(|| self.default_llm.clone())
            .ok_or_else(|| CrewError::InvalidCrew(format!("agent '{}' has no model", agent.role)))
    }

    async fn plan(&self, agents: &[Agent], tasks: &[Task]) -> Result<CrewPlan, CrewError> {
        let llm = self
            .default_llm
            .clone()
            .ok_or_else(|| CrewError::InvalidCrew("planning needs a crew default model".to_string()))?;

        let listing = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                format!(
                    "Task Number {} - {}\nAgent: {}\nAgent Goal: {}\nExpected Output: {}",
                    i + 1,
                    t.description,
                    agents[t.agent].role,
                    agents[t.agent].goal,
                    t.expected_output
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = ChatRequest::new(vec![
            ChatMessage::system(
                "You are the Task Execution Planner. Your goal is to improve the coordination of the crew \
                 by writing a concise, step-by-step plan for every task.",
            ),
            ChatMessage::user(format!(
                "Based on these tasks, create a plan for each one, keyed by task number:\n\n{}",
                listing
            )),
        ])
        .with_response_format(agentflow_core::response_format::<CrewPlan>());

        let response = llm.complete(&request).await?;
        let plan: CrewPlan = parse_structured(response.text())?;
        tracing::info!(steps = plan.steps.len(), "crew plan created");
        Ok(plan)
    }

    async fn execute(
        &self,
        agent: &Agent,
        task: &Task,
        previous: &[TaskOutput],
        plan_step: Option<&str>,
    ) -> Result<TaskOutput, CrewError> {
        let llm = self.llm_for(agent)?;
        let mut messages = vec![
            ChatMessage::system(persona(agent)),
            ChatMessage::user(task_prompt(task, previous, plan_step, !agent.tools.is_empty())),
        ];

        let mut raw = self.answer(&llm, agent, task, &messages).await?;

        if task.human_input
            && let Some(feedback) = &self.feedback
        {
            for round in 1..=MAX_FEEDBACK_ROUNDS {
                let notes = feedback.review(&task.description, &raw).await?;
                if notes.trim().is_empty() {
                    break;
                }
                tracing::info!(round, "revising task output from human feedback");
                messages.push(ChatMessage::assistant(raw.clone()));
                messages.push(ChatMessage::user(format!(
                    "Feedback from the human reviewer:\n{}\n\nRevise your final answer to address it.",
                    notes.trim()
                )));
                raw = self.answer(&llm, agent, task, &messages).await?;
            }
        }

        let json = match &task.output_schema {
            Some(format) => Some(parse_task_json(format, &raw)?),
            None => None,
        };

        Ok(TaskOutput {
            description: task.description.clone(),
            agent_role: agent.role.clone(),
            raw,
            json,
            skipped: false,
        })
    }

    /// One answer from the agent, through the tool loop when it has tools.
    async fn answer(
        &self,
        llm: &Arc<dyn LlmClient>,
        agent: &Agent,
        task: &Task,
        messages: &[ChatMessage],
    ) -> Result<String, CrewError> {
        if !agent.tools.is_empty() {
            let outcome = run_tool_loop(
                llm.as_ref(),
                messages.to_vec(),
                &agent.tools,
                agent.max_iterations,
            )
            .await?;
            return Ok(outcome.final_text);
        }

        let mut request = ChatRequest::new(messages.to_vec());
        if let Some(format) = &task.output_schema {
            request = request.with_response_format(format.clone());
        }
        Ok(llm.complete(&request).await?.message.content)
    }
}

fn persona(agent: &Agent) -> String {
    format!(
        "You are {}. {}\nYour personal goal is: {}",
        agent.role, agent.backstory, agent.goal
    )
}

fn task_prompt(task: &Task, previous: &[TaskOutput], plan_step: Option<&str>, has_tools: bool) -> String {
    let mut prompt = format!(
        "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n\
         You MUST return the actual complete content as the final answer, not a summary.",
        task.description, task.expected_output
    );

    // With tools the request carries no schema, so spell it out.
    if has_tools && let Some(format) = &task.output_schema {
        prompt.push_str(&format!(
            "\n\nYour final answer must be a single JSON object matching this schema:\n{}",
            format.schema
        ));
    }

    if let Some(step) = plan_step {
        prompt.push_str(&format!("\n\nPlan for this task:\n{}", step));
    }

    let context: Vec<&str> = previous
        .iter()
        .filter(|o| !o.skipped)
        .map(|o| o.raw.as_str())
        .collect();
    if !context.is_empty() {
        prompt.push_str(&format!(
            "\n\nThis is the context you're working with:\n{}",
            context.join("\n\n----------\n\n")
        ));
    }

    prompt
}

fn parse_task_json(format: &ResponseFormat, raw: &str) -> Result<Value, CrewError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        CrewError::Llm(LlmError::Structured(format!(
            "{}: task output is not valid JSON: {}",
            format.name, e
        )))
    })
}
