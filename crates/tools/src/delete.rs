//! Task deletion tools.
//!
//! Every delete records the pre-delete snapshot (`original_state`) in its
//! envelope. The envelope lands in the history log as a tool result, which
//! is what makes "restore the task I just deleted" possible later.

use async_trait::async_trait;
use serde_json::{json, Value};

use voxtask_core::{ToolEnvelope, ToolHandler};
use voxtask_store::TaskStore;

pub struct DeleteTask {
    tasks: TaskStore,
}

impl DeleteTask {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for DeleteTask {
    fn name(&self) -> &'static str {
        "delete_task"
    }

    fn description(&self) -> &'static str {
        "Delete a task permanently. Use this when the user wants to remove a task. \
         The deleted task's full state is recorded so it can be restored later."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "integer", "description": "ID of the task to delete (required)"}
            },
            "required": ["task_id"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let Some(task_id) = input["task_id"].as_i64() else {
            return ToolEnvelope::fail("task_id must be an integer");
        };

        match self.tasks.delete(task_id).await {
            Ok(snapshot) => {
                let state = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
                ToolEnvelope::ok(format!("Task '{}' deleted successfully", snapshot.title))
                    .with("original_state", state)
            }
            Err(voxtask_core::StoreError::TaskNotFound(id)) => {
                ToolEnvelope::fail(format!("Task with ID {id} not found"))
            }
            Err(e) => ToolEnvelope::fail(e.to_string()),
        }
    }
}

pub struct DeleteMultipleTasks {
    tasks: TaskStore,
}

impl DeleteMultipleTasks {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for DeleteMultipleTasks {
    fn name(&self) -> &'static str {
        "delete_multiple_tasks"
    }

    fn description(&self) -> &'static str {
        "Delete multiple tasks at once. Use when the user wants to bulk delete tasks."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_ids": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "IDs of tasks to delete (required)"
                }
            },
            "required": ["task_ids"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let ids: Vec<i64> = input["task_ids"]
            .as_array()
            .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();
        if ids.is_empty() {
            return ToolEnvelope::fail("task_ids must not be empty");
        }

        let outcome = self.tasks.delete_many(&ids).await;
        let snapshots: Vec<Value> = outcome
            .succeeded
            .iter()
            .filter_map(|t| serde_json::to_value(t).ok())
            .collect();
        let deleted: Vec<Value> = outcome
            .succeeded
            .iter()
            .map(|t| json!({"id": t.id, "title": t.title}))
            .collect();

        let mut envelope = if outcome.all_ok() {
            ToolEnvelope::ok(format!("{} tasks deleted successfully", deleted.len()))
        } else {
            ToolEnvelope::fail(format!(
                "Deleted {} of {} tasks; {} failed",
                deleted.len(),
                ids.len(),
                outcome.failed.len()
            ))
        }
        .with("tasks", Value::Array(deleted))
        .with("original_states", Value::Array(snapshots));

        if !outcome.failed.is_empty() {
            let failed: Vec<Value> = outcome
                .failed
                .iter()
                .map(|(id, reason)| json!({"task_id": id, "reason": reason}))
                .collect();
            envelope = envelope.with("failed", Value::Array(failed));
        }
        envelope
    }
}
