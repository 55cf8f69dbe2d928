//! Task update tools.
//!
//! A significant deadline move (3 or more days) attaches a `change_view`
//! navigation command so the client follows the task to its new spot:
//! 3+ days → daily, 6+ → weekly, 25+ → monthly.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use voxtask_core::{TaskPatch, TaskPriority, TaskStatus, ToolEnvelope, ToolHandler, UiCommand, ViewMode};
use voxtask_store::TaskStore;

use crate::datetime::parse_flexible;
use crate::{opt_str, task_detail};

fn patch_properties() -> Value {
    json!({
        "title": {"type": "string", "description": "New title"},
        "description": {"type": "string", "description": "New description"},
        "notes": {"type": "string", "description": "New notes"},
        "priority": {
            "type": "string",
            "enum": ["low", "medium", "high", "urgent"],
            "description": "New priority level"
        },
        "status": {
            "type": "string",
            "enum": ["todo", "in_progress", "completed", "cancelled"],
            "description": "New status"
        },
        "scheduled_date": {"type": "string", "description": "New scheduled date, ISO 8601"},
        "deadline": {"type": "string", "description": "New deadline, ISO 8601"}
    })
}

fn patch_from_input(input: &Value) -> TaskPatch {
    let now = Utc::now();
    TaskPatch {
        title: opt_str(input, "title"),
        description: opt_str(input, "description"),
        notes: opt_str(input, "notes"),
        priority: opt_str(input, "priority").and_then(|p| p.parse::<TaskPriority>().ok()),
        status: opt_str(input, "status").and_then(|s| s.parse::<TaskStatus>().ok()),
        scheduled_date: opt_str(input, "scheduled_date").and_then(|s| parse_flexible(&s, now)),
        deadline: opt_str(input, "deadline").and_then(|s| parse_flexible(&s, now)),
    }
}

/// View granularity for a move of `days` days.
fn view_for_shift(days: i64) -> Option<ViewMode> {
    let days = days.abs();
    if days >= 25 {
        Some(ViewMode::Monthly)
    } else if days >= 6 {
        Some(ViewMode::Weekly)
    } else if days >= 3 {
        Some(ViewMode::Daily)
    } else {
        None
    }
}

pub struct UpdateTask {
    tasks: TaskStore,
}

impl UpdateTask {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for UpdateTask {
    fn name(&self) -> &'static str {
        "update_task"
    }

    fn description(&self) -> &'static str {
        "Update an existing task. Use this to change task details, status, priority, schedule, or deadline."
    }

    fn input_schema(&self) -> Value {
        let mut properties = patch_properties();
        properties["task_id"] =
            json!({"type": "integer", "description": "ID of the task to update (required)"});
        json!({
            "type": "object",
            "properties": properties,
            "required": ["task_id"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let Some(task_id) = input["task_id"].as_i64() else {
            return ToolEnvelope::fail("task_id must be an integer");
        };

        let original = match self.tasks.get(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return ToolEnvelope::fail(format!("Task with ID {task_id} not found")),
            Err(e) => return ToolEnvelope::fail(e.to_string()),
        };

        let patch = patch_from_input(&input);
        let updated = match self.tasks.update(task_id, &patch).await {
            Ok(task) => task,
            Err(e) => return ToolEnvelope::fail(e.to_string()),
        };

        let mut envelope = ToolEnvelope::ok(format!("Task '{}' updated successfully", updated.title))
            .with("task", task_detail(&updated));

        // Follow a significantly moved deadline with a view change.
        if let (Some(old), Some(new)) = (original.deadline, updated.deadline) {
            if patch.deadline.is_some() {
                let days = (new - old).num_days();
                if let Some(view_mode) = view_for_shift(days) {
                    envelope =
                        envelope.with_ui(UiCommand::view(view_mode, Some(new.date_naive())));
                }
            }
        }

        envelope
    }
}

pub struct UpdateMultipleTasks {
    tasks: TaskStore,
}

impl UpdateMultipleTasks {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for UpdateMultipleTasks {
    fn name(&self) -> &'static str {
        "update_multiple_tasks"
    }

    fn description(&self) -> &'static str {
        "Update multiple tasks at once. Use for bulk updates like 'push all tasks to next week'."
    }

    fn input_schema(&self) -> Value {
        let mut updates = patch_properties();
        updates["deadline_shift_days"] = json!({
            "type": "integer",
            "description": "Shift schedule and deadline by N days (e.g. 7 for next week)"
        });
        json!({
            "type": "object",
            "properties": {
                "task_ids": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "description": "IDs of tasks to update (required)"
                },
                "updates": {
                    "type": "object",
                    "description": "Updates applied to all listed tasks",
                    "properties": updates
                }
            },
            "required": ["task_ids", "updates"]
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

        let updates = &input["updates"];
        let patch = patch_from_input(updates);
        let shift_days = updates["deadline_shift_days"].as_i64();

        let outcome = self.tasks.update_many(&ids, &patch, shift_days).await;
        let updated: Vec<Value> = outcome.succeeded.iter().map(task_detail).collect();

        let mut envelope = if outcome.all_ok() {
            ToolEnvelope::ok(format!("{} tasks updated successfully", updated.len()))
        } else {
            ToolEnvelope::fail(format!(
                "Updated {} of {} tasks; {} failed",
                updated.len(),
                ids.len(),
                outcome.failed.len()
            ))
        }
        .with("tasks", Value::Array(updated));

        if !outcome.failed.is_empty() {
            let failed: Vec<Value> = outcome
                .failed
                .iter()
                .map(|(id, reason)| json!({"task_id": id, "reason": reason}))
                .collect();
            envelope = envelope.with("failed", Value::Array(failed));
        }

        // After a bulk shift, navigate to where the tasks landed.
        if let (Some(days), Some(first)) = (shift_days, outcome.succeeded.first()) {
            if let Some(view_mode) = view_for_shift(days) {
                let target = first.deadline.unwrap_or(first.scheduled_date).date_naive();
                envelope = envelope.with_ui(UiCommand::view(view_mode, Some(target)));
            }
        }

        envelope
    }
}
