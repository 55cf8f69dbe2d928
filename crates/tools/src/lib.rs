//! Built-in tools for the voxtask agent.
//!
//! Every tool validates against its JSON-schema contract at the registry
//! boundary and returns the normalized envelope. Tools hold short-lived
//! store handles; none keeps a handle across a suspension that is not
//! itself store-bound.

pub mod create;
pub mod datetime;
pub mod delete;
pub mod query;
pub mod recall;
pub mod ui;
pub mod update;

use serde_json::Value;

use voxtask_core::{Task, ToolRegistry};
use voxtask_store::{HistoryStore, TaskStore};

/// Create the registry with all twelve tools, in the order they are
/// enumerated to the model.
pub fn default_registry(tasks: TaskStore, history: HistoryStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(create::CreateTask::new(tasks.clone())));
    registry.register(Box::new(create::CreateMultipleTasks::new(tasks.clone())));
    registry.register(Box::new(update::UpdateTask::new(tasks.clone())));
    registry.register(Box::new(update::UpdateMultipleTasks::new(tasks.clone())));
    registry.register(Box::new(delete::DeleteTask::new(tasks.clone())));
    registry.register(Box::new(delete::DeleteMultipleTasks::new(tasks.clone())));
    registry.register(Box::new(query::ListTasks::new(tasks.clone())));
    registry.register(Box::new(query::SearchTasks::new(tasks.clone())));
    registry.register(Box::new(query::GetTaskStats::new(tasks)));
    registry.register(Box::new(ui::ChangeUiView));
    registry.register(Box::new(ui::ShowChoices));
    registry.register(Box::new(recall::LoadFullHistory::new(history)));
    registry
}

/// The task shape tool envelopes expose to the model.
pub(crate) fn task_detail(task: &Task) -> Value {
    serde_json::json!({
        "id": task.id,
        "title": task.title,
        "description": task.description,
        "notes": task.notes,
        "priority": task.priority,
        "status": task.status,
        "scheduled_date": task.scheduled_date.to_rfc3339(),
        "deadline": task.deadline.map(|d| d.to_rfc3339()),
        "created_at": task.created_at.to_rfc3339(),
    })
}

/// Read an optional non-empty string field from validated input.
pub(crate) fn opt_str(input: &Value, key: &str) -> Option<String> {
    input[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxtask_store::Database;

    #[tokio::test]
    async fn registry_enumerates_all_twelve_tools_in_order() {
        let db = Database::in_memory().await.unwrap();
        let registry = default_registry(db.tasks(), db.history());
        assert_eq!(
            registry.names(),
            vec![
                "create_task",
                "create_multiple_tasks",
                "update_task",
                "update_multiple_tasks",
                "delete_task",
                "delete_multiple_tasks",
                "list_tasks",
                "search_tasks",
                "get_task_stats",
                "change_ui_view",
                "show_choices",
                "load_full_history",
            ]
        );
    }

    #[tokio::test]
    async fn every_tool_declares_an_object_schema() {
        let db = Database::in_memory().await.unwrap();
        let registry = default_registry(db.tasks(), db.history());
        for def in registry.definitions() {
            assert_eq!(
                def.input_schema["type"], "object",
                "{} schema must be an object",
                def.name
            );
            assert!(!def.description.is_empty());
        }
    }
}
