// ABOUTME: TaskManager server: an in-memory to-do list with add/list/complete/remove tools.
// ABOUTME: Also serves the list as the tasks://all resource and a plan_my_day prompt.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use agentflow_core::tools::required_str;
use agentflow_core::{Tool, ToolError};

use crate::protocol::{ResourceContents, ResourceInfo};
use crate::server::{McpServer, PromptTemplate, ResourceProvider};

pub const TASKS_URI: &str = "tasks://all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<Vec<TaskItem>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, title: &str) -> Result<TaskItem, ToolError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ToolError::InvalidArguments("task title must not be empty".to_string()));
        }
        let task = TaskItem {
            id: ulid::Ulid::new().to_string(),
            title: title.to_string(),
            done: false,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.tasks.write().await.push(task.clone());
        tracing::info!(id = %task.id, title = %task.title, "task added");
        Ok(task)
    }

    pub async fn list(&self) -> Vec<TaskItem> {
        self.tasks.read().await.clone()
    }

    pub async fn complete(&self, id: &str) -> Result<TaskItem, ToolError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ToolError::Execution(format!("no task with id {}", id)))?;
        if !task.done {
            task.done = true;
            task.completed_at = Some(Utc::now());
        }
        Ok(task.clone())
    }

    pub async fn remove(&self, id: &str) -> Result<TaskItem, ToolError> {
        let mut tasks = self.tasks.write().await;
        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| ToolError::Execution(format!("no task with id {}", id)))?;
        Ok(tasks.remove(index))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Execution(e.to_string()))
}

fn id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {"id": {"type": "string", "description": description}},
        "required": ["id"]
    })
}

struct AddTask(Arc<TaskStore>);

#[async_trait]
impl Tool for AddTask {
    fn name(&self) -> &str {
        "add_task"
    }
    fn description(&self) -> &str {
        "Add a new task to the to-do list and return it"
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"title": {"type": "string", "description": "What needs to be done"}},
            "required": ["title"]
        })
    }
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        to_json(&self.0.add(required_str(&args, "title")?).await?)
    }
}

struct ListTasks(Arc<TaskStore>);

#[async_trait]
impl Tool for ListTasks {
    fn name(&self) -> &str {
        "list_tasks"
    }
    fn description(&self) -> &str {
        "List every task with its id, title and completion state"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn call(&self, _args: Value) -> Result<Value, ToolError> {
        to_json(&self.0.list().await)
    }
}

struct CompleteTask(Arc<TaskStore>);

#[async_trait]
impl Tool for CompleteTask {
    fn name(&self) -> &str {
        "complete_task"
    }
    fn description(&self) -> &str {
        "Mark a task as done"
    }
    fn parameters_schema(&self) -> Value {
        id_schema("Id of the task to complete")
    }
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        to_json(&self.0.complete(required_str(&args, "id")?).await?)
    }
}

struct RemoveTask(Arc<TaskStore>);

#[async_trait]
impl Tool for RemoveTask {
    fn name(&self) -> &str {
        "remove_task"
    }
    fn description(&self) -> &str {
        "Delete a task from the list"
    }
    fn parameters_schema(&self) -> Value {
        id_schema("Id of the task to remove")
    }
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        to_json(&self.0.remove(required_str(&args, "id")?).await?)
    }
}

struct TasksResource(Arc<TaskStore>);

#[async_trait]
impl ResourceProvider for TasksResource {
    async fn list_resources(&self) -> Vec<ResourceInfo> {
        vec![ResourceInfo {
            uri: TASKS_URI.to_string(),
            name: "all_tasks".to_string(),
            description: Some("The full to-do list as JSON".to_string()),
            mime_type: Some("application/json".to_string()),
        }]
    }

    async fn read_resource(&self, uri: &str) -> Option<ResourceContents> {
        if uri != TASKS_URI {
            return None;
        }
        let tasks = self.0.list().await;
        match serde_json::to_string_pretty(&tasks) {
            Ok(text) => Some(ResourceContents::text(uri, "application/json", text)),
            Err(e) => {
                tracing::warn!(error = %e, "could not serialize tasks");
                None
            }
        }
    }
}

pub fn plan_my_day_prompt() -> PromptTemplate {
    PromptTemplate::new(
        "plan_my_day",
        "Turn the current to-do list into a plan for the day around a chosen focus",
        |args| {
            let focus = args.get("focus").map(String::as_str).unwrap_or_default();
            format!(
                "Help me plan my day with a focus on '{focus}'.\n\
                 1. Call list_tasks to see what is on my to-do list.\n\
                 2. Pick the tasks that matter most for '{focus}' and order them sensibly.\n\
                 3. Suggest anything missing and offer to add it with add_task.\n\
                 Present the plan as a short, time-ordered bulleted list."
            )
        },
    )
    .with_argument("focus", "What the day should be about (e.g. 'deep work')")
}

pub fn tasks_server(store: Arc<TaskStore>) -> McpServer {
    McpServer::builder()
        .name("TaskManager")
        .tool(Arc::new(AddTask(Arc::clone(&store))))
        .tool(Arc::new(ListTasks(Arc::clone(&store))))
        .tool(Arc::new(CompleteTask(Arc::clone(&store))))
        .tool(Arc::new(RemoveTask(Arc::clone(&store))))
        .resource(Arc::new(TasksResource(store)))
        .prompt(plan_my_day_prompt())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_complete_remove_lifecycle() {
        let store = TaskStore::new();
        let a = store.add("  write report ").await.unwrap();
        let b = store.add("call mom").await.unwrap();

        assert_eq!(a.title, "write report");
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 26);

        let done = store.complete(&a.id).await.unwrap();
        assert!(done.done);
        assert!(done.completed_at.is_some());

        let removed = store.remove(&b.id).await.unwrap();
        assert_eq!(removed.title, "call mom");
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_title_and_unknown_ids_fail() {
        let store = TaskStore::new();
        assert!(matches!(store.add("   ").await, Err(ToolError::InvalidArguments(_))));
        assert!(matches!(store.complete("nope").await, Err(ToolError::Execution(_))));
        assert!(matches!(store.remove("nope").await, Err(ToolError::Execution(_))));
    }

    #[tokio::test]
    async fn resource_reflects_store() {
        let store = Arc::new(TaskStore::new());
        store.add("water plants").await.unwrap();
        let resource = TasksResource(Arc::clone(&store));

        let contents = resource.read_resource(TASKS_URI).await.unwrap();
        let tasks: Vec<TaskItem> = serde_json::from_str(contents.text.as_deref().unwrap()).unwrap();
        assert_eq!(tasks[0].title, "water plants");
        assert!(resource.read_resource("tasks://other").await.is_none());
    }

    #[tokio::test]
    async fn server_exposes_tools_through_rpc() {
        let store = Arc::new(TaskStore::new());
        let server = tasks_server(Arc::clone(&store));

        let resp = server
            .handle_message(json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": {"name": "add_task", "arguments": {"title": "buy milk"}}
            }))
            .await
            .unwrap();
        let text = resp.result.unwrap()["content"][0]["text"].as_str().unwrap().to_string();
        let added: TaskItem = serde_json::from_str(&text).unwrap();
        assert_eq!(added.title, "buy milk");

        let resp = server
            .handle_message(json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "complete_task", "arguments": {"id": "missing"}}
            }))
            .await
            .unwrap();
        assert_eq!(resp.result.unwrap()["isError"], true);
    }

    #[test]
    fn plan_prompt_uses_focus() {
        let args = [("focus".to_string(), "deep work".to_string())].into_iter().collect();
        let text = plan_my_day_prompt().render(&args).unwrap();
        assert!(text.contains("focus on 'deep work'"));
    }
}
