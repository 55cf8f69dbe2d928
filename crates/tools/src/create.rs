//! Task creation tools.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use voxtask_core::{NewTask, TaskPriority, ToolEnvelope, ToolHandler};
use voxtask_store::TaskStore;

use crate::datetime::parse_flexible;
use crate::{opt_str, task_detail};

fn task_properties() -> Value {
    json!({
        "title": {"type": "string", "description": "Task title (required)"},
        "description": {"type": "string", "description": "Detailed description of the task"},
        "notes": {"type": "string", "description": "Additional notes about the task"},
        "priority": {
            "type": "string",
            "enum": ["low", "medium", "high", "urgent"],
            "description": "Priority level (default: medium)"
        },
        "scheduled_date": {
            "type": "string",
            "description": "When the task is planned, ISO 8601 (defaults to today at noon)"
        },
        "deadline": {
            "type": "string",
            "description": "When the task must be done by, ISO 8601 (optional)"
        }
    })
}

fn new_task_from_input(input: &Value) -> NewTask {
    let now = Utc::now();
    NewTask {
        title: opt_str(input, "title").unwrap_or_default(),
        description: opt_str(input, "description"),
        notes: opt_str(input, "notes"),
        priority: opt_str(input, "priority")
            .and_then(|p| p.parse::<TaskPriority>().ok())
            .unwrap_or_default(),
        scheduled_date: opt_str(input, "scheduled_date").and_then(|s| parse_flexible(&s, now)),
        deadline: opt_str(input, "deadline").and_then(|s| parse_flexible(&s, now)),
    }
}

pub struct CreateTask {
    tasks: TaskStore,
}

impl CreateTask {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for CreateTask {
    fn name(&self) -> &'static str {
        "create_task"
    }

    fn description(&self) -> &'static str {
        "Create a new task. Use this when the user wants to add a new task or todo item."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": task_properties(),
            "required": ["title"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let new = new_task_from_input(&input);
        let title = new.title.clone();
        match self.tasks.create(new).await {
            Ok(task) => ToolEnvelope::ok(format!("Task '{title}' created successfully"))
                .with("task", task_detail(&task)),
            Err(e) => ToolEnvelope::fail(e.to_string()),
        }
    }
}

pub struct CreateMultipleTasks {
    tasks: TaskStore,
}

impl CreateMultipleTasks {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for CreateMultipleTasks {
    fn name(&self) -> &'static str {
        "create_multiple_tasks"
    }

    fn description(&self) -> &'static str {
        "Create multiple tasks at once. Use this when the user wants to add several tasks in one command."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "description": "Array of tasks to create",
                    "items": {
                        "type": "object",
                        "properties": task_properties(),
                        "required": ["title"]
                    }
                }
            },
            "required": ["tasks"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let items: Vec<NewTask> = input["tasks"]
            .as_array()
            .map(|arr| arr.iter().map(new_task_from_input).collect())
            .unwrap_or_default();
        if items.is_empty() {
            return ToolEnvelope::fail("No tasks given");
        }

        let total = items.len();
        let outcome = self.tasks.create_many(items).await;
        let created: Vec<Value> = outcome.succeeded.iter().map(task_detail).collect();

        let mut envelope = if outcome.all_ok() {
            ToolEnvelope::ok(format!("{} tasks created successfully", created.len()))
        } else {
            ToolEnvelope::fail(format!(
                "Created {} of {total} tasks; {} failed",
                created.len(),
                outcome.failed.len()
            ))
        }
        .with("tasks", Value::Array(created));

        if !outcome.failed.is_empty() {
            let failed: Vec<Value> = outcome
                .failed
                .iter()
                .map(|(index, reason)| json!({"index": index, "reason": reason}))
                .collect();
            envelope = envelope.with("failed", Value::Array(failed));
        }
        envelope
    }
}
