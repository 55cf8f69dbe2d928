//! Read-only task tools: list, search, stats.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use voxtask_core::{
    TaskFilter, TaskPriority, TaskStatus, ToolEnvelope, ToolHandler, UiCommand, ViewMode,
};
use voxtask_store::TaskStore;

use crate::datetime::parse_flexible;
use crate::{opt_str, task_detail};

pub struct ListTasks {
    tasks: TaskStore,
}

impl ListTasks {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for ListTasks {
    fn name(&self) -> &'static str {
        "list_tasks"
    }

    fn description(&self) -> &'static str {
        "List tasks with optional filters. Use this to show the user their tasks \
         for a status, priority, or scheduled-date range."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["todo", "in_progress", "completed", "cancelled"],
                    "description": "Filter by task status"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "urgent"],
                    "description": "Filter by priority level"
                },
                "scheduled_after": {"type": "string", "description": "Only tasks scheduled at or after this ISO 8601 date"},
                "scheduled_before": {"type": "string", "description": "Only tasks scheduled at or before this ISO 8601 date"},
                "limit": {"type": "integer", "description": "Maximum number of tasks to return (default 10)"}
            }
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let now = Utc::now();
        let filter = TaskFilter {
            status: opt_str(&input, "status").and_then(|s| s.parse::<TaskStatus>().ok()),
            priority: opt_str(&input, "priority").and_then(|p| p.parse::<TaskPriority>().ok()),
            scheduled_after: opt_str(&input, "scheduled_after")
                .and_then(|s| parse_flexible(&s, now)),
            scheduled_before: opt_str(&input, "scheduled_before")
                .and_then(|s| parse_flexible(&s, now)),
            text: None,
            limit: Some(input["limit"].as_u64().unwrap_or(10) as u32),
        };

        match self.tasks.list(&filter).await {
            Ok(tasks) => {
                let items: Vec<Value> = tasks.iter().map(task_detail).collect();
                ToolEnvelope::ok(format!("Found {} tasks", items.len()))
                    .with("count", json!(items.len()))
                    .with("tasks", Value::Array(items))
            }
            Err(e) => ToolEnvelope::fail(e.to_string()),
        }
    }
}

pub struct SearchTasks {
    tasks: TaskStore,
}

impl SearchTasks {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for SearchTasks {
    fn name(&self) -> &'static str {
        "search_tasks"
    }

    fn description(&self) -> &'static str {
        "Search for tasks by keyword in title, description, or notes. Use for queries \
         like 'show me administrative tasks' or 'find tasks about X'. The result \
         switches the UI to a list of exactly the matching tasks."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search text matched against title, description, and notes (required)"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "urgent"],
                    "description": "Filter by priority"
                },
                "status": {
                    "type": "string",
                    "enum": ["todo", "in_progress", "completed", "cancelled"],
                    "description": "Filter by status"
                },
                "limit": {"type": "integer", "description": "Maximum results (default 10)"}
            },
            "required": ["query"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let query = opt_str(&input, "query").unwrap_or_default();
        let terms: Vec<String> = query.split_whitespace().map(String::from).collect();
        let status = opt_str(&input, "status").and_then(|s| s.parse::<TaskStatus>().ok());
        let priority = opt_str(&input, "priority").and_then(|p| p.parse::<TaskPriority>().ok());

        let filter = TaskFilter {
            status,
            priority,
            limit: Some(input["limit"].as_u64().unwrap_or(10) as u32),
            ..TaskFilter::default()
        };

        let tasks = match self.tasks.search(&terms, &filter).await {
            Ok(tasks) => tasks,
            Err(e) => return ToolEnvelope::fail(e.to_string()),
        };

        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        let items: Vec<Value> = tasks.iter().map(task_detail).collect();

        let ui_command = UiCommand::ChangeView {
            view_mode: ViewMode::List,
            target_date: None,
            sort_by: None,
            sort_order: None,
            filter_status: status.map(|s| s.as_str().to_string()),
            filter_priority: priority.map(|p| p.as_str().to_string()),
            search_results: Some(ids),
            search_query: Some(query.clone()),
        };

        ToolEnvelope::ok(format!("Found {} tasks matching '{query}'", items.len()))
            .with("count", json!(items.len()))
            .with("tasks", Value::Array(items))
            .with_ui(ui_command)
    }
}

pub struct GetTaskStats {
    tasks: TaskStore,
}

impl GetTaskStats {
    pub fn new(tasks: TaskStore) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl ToolHandler for GetTaskStats {
    fn name(&self) -> &'static str {
        "get_task_stats"
    }

    fn description(&self) -> &'static str {
        "Get statistics about tasks (totals by status, upcoming and missed deadlines). \
         Use this to give the user an overview."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _input: Value) -> ToolEnvelope {
        match self.tasks.stats().await {
            Ok(stats) => {
                let value = serde_json::to_value(&stats).unwrap_or(Value::Null);
                ToolEnvelope::ok("Task statistics").with("stats", value)
            }
            Err(e) => ToolEnvelope::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxtask_core::NewTask;
    use voxtask_store::Database;

    async fn seeded_store() -> TaskStore {
        let db = Database::in_memory().await.unwrap();
        let store = db.tasks();
        for title in ["Administrative filing", "Admin review", "Buy groceries"] {
            store.create(NewTask::titled(title)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn list_respects_status_filter() {
        let store = seeded_store().await;
        let tool = ListTasks::new(store.clone());

        let env = tool.call(json!({"status": "todo", "limit": 2})).await;
        assert!(env.success);
        assert_eq!(env.payload["count"], 2);
    }

    #[tokio::test]
    async fn search_attaches_change_view_with_matching_ids() {
        let store = seeded_store().await;
        let tool = SearchTasks::new(store);

        let env = tool.call(json!({"query": "admin"})).await;
        assert!(env.success);
        assert_eq!(env.payload["count"], 2);

        match env.ui_command {
            Some(UiCommand::ChangeView {
                view_mode,
                search_results,
                search_query,
                ..
            }) => {
                assert_eq!(view_mode, ViewMode::List);
                assert_eq!(search_results.unwrap().len(), 2);
                assert_eq!(search_query.as_deref(), Some("admin"));
            }
            other => panic!("expected change_view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_no_matches_still_switches_view() {
        let store = seeded_store().await;
        let tool = SearchTasks::new(store);
        let env = tool.call(json!({"query": "zzz"})).await;
        assert!(env.success);
        assert_eq!(env.payload["count"], 0);
        assert!(env.ui_command.is_some());
    }

    #[tokio::test]
    async fn stats_reports_counts() {
        let store = seeded_store().await;
        let tool = GetTaskStats::new(store);
        let env = tool.call(json!({})).await;
        assert!(env.success);
        assert_eq!(env.payload["stats"]["total"], 3);
        assert_eq!(env.payload["stats"]["todo"], 3);
    }
}
