//! Pure UI tools — no task-store side effects.

use async_trait::async_trait;
use serde_json::{json, Value};

use voxtask_core::{Choice, SortBy, SortOrder, ToolEnvelope, ToolHandler, UiCommand, ViewMode};

use crate::datetime::parse_date;
use crate::opt_str;

pub struct ChangeUiView;

#[async_trait]
impl ToolHandler for ChangeUiView {
    fn name(&self) -> &'static str {
        "change_ui_view"
    }

    fn description(&self) -> &'static str {
        "Change the UI view and date selection to help the user visualize tasks. \
         Use when the user wants to see a specific time period, view mode, or a \
         filtered/sorted list."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "view_mode": {
                    "type": "string",
                    "enum": ["daily", "weekly", "monthly", "list"],
                    "description": "View mode to switch to (required)"
                },
                "target_date": {
                    "type": "string",
                    "description": "Target date, ISO 8601 (YYYY-MM-DD). The view centers on this date."
                },
                "sort_by": {
                    "type": "string",
                    "enum": ["deadline", "priority", "created"],
                    "description": "Sort field (list view only)"
                },
                "sort_order": {
                    "type": "string",
                    "enum": ["asc", "desc"],
                    "description": "Sort direction (list view only)"
                },
                "filter_status": {
                    "type": "string",
                    "enum": ["all", "todo", "in_progress", "completed", "cancelled"],
                    "description": "Status filter (list view only)"
                },
                "filter_priority": {
                    "type": "string",
                    "enum": ["all", "low", "medium", "high", "urgent"],
                    "description": "Priority filter (list view only)"
                }
            },
            "required": ["view_mode"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let view_mode = match input["view_mode"].as_str() {
            Some("daily") => ViewMode::Daily,
            Some("weekly") => ViewMode::Weekly,
            Some("monthly") => ViewMode::Monthly,
            Some("list") => ViewMode::List,
            other => return ToolEnvelope::fail(format!("unknown view_mode: {other:?}")),
        };

        let target_date = opt_str(&input, "target_date").and_then(|s| parse_date(&s));
        let is_list = view_mode == ViewMode::List;

        let sort_by = is_list
            .then(|| match input["sort_by"].as_str() {
                Some("deadline") => Some(SortBy::Deadline),
                Some("priority") => Some(SortBy::Priority),
                Some("created") => Some(SortBy::Created),
                _ => None,
            })
            .flatten();
        let sort_order = is_list
            .then(|| match input["sort_order"].as_str() {
                Some("asc") => Some(SortOrder::Asc),
                Some("desc") => Some(SortOrder::Desc),
                _ => None,
            })
            .flatten();

        // "all" means no filter.
        let filter_status = is_list
            .then(|| opt_str(&input, "filter_status").filter(|s| s != "all"))
            .flatten();
        let filter_priority = is_list
            .then(|| opt_str(&input, "filter_priority").filter(|p| p != "all"))
            .flatten();

        let mut message = format!("Switched to {} view", input["view_mode"].as_str().unwrap_or(""));
        if let Some(date) = target_date {
            message.push_str(&format!(" for {date}"));
        }
        if let Some(ref status) = filter_status {
            message.push_str(&format!(", filtered by status: {status}"));
        }
        if let Some(ref priority) = filter_priority {
            message.push_str(&format!(", filtered by priority: {priority}"));
        }

        ToolEnvelope::ok(message).with_ui(UiCommand::ChangeView {
            view_mode,
            target_date,
            sort_by,
            sort_order,
            filter_status,
            filter_priority,
            search_results: None,
            search_query: None,
        })
    }
}

pub struct ShowChoices;

#[async_trait]
impl ToolHandler for ShowChoices {
    fn name(&self) -> &'static str {
        "show_choices"
    }

    fn description(&self) -> &'static str {
        "Show the user a read-only choice modal (e.g. when several tasks match). \
         The user narrates their selection in the next turn."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Modal title (required)"},
                "choices": {
                    "type": "array",
                    "description": "Options to present",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "label": {"type": "string"},
                            "description": {"type": "string"},
                            "value": {"description": "Opaque payload echoed on selection"}
                        },
                        "required": ["id", "label"]
                    }
                }
            },
            "required": ["title", "choices"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let title = opt_str(&input, "title").unwrap_or_default();
        let choices: Vec<Choice> = match serde_json::from_value(input["choices"].clone()) {
            Ok(choices) => choices,
            Err(e) => return ToolEnvelope::fail(format!("invalid choices: {e}")),
        };
        if choices.is_empty() {
            return ToolEnvelope::fail("choices must not be empty");
        }

        ToolEnvelope::ok(format!("Presented {} choices", choices.len()))
            .with_ui(UiCommand::ShowChoices { title, choices })
    }
}
