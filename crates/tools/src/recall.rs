//! Conversation recall tool.
//!
//! Only the last few messages ride along in the prompt prefix; this tool
//! searches the full log to resurrect older context. A matched turn comes
//! back with its recorded tool calls (original inputs) and tool results —
//! including the `original_state` snapshots that deletes leave behind.

use async_trait::async_trait;
use serde_json::{json, Value};

use voxtask_core::{ToolEnvelope, ToolHandler};
use voxtask_store::HistoryStore;

pub struct LoadFullHistory {
    history: HistoryStore,
}

impl LoadFullHistory {
    pub fn new(history: HistoryStore) -> Self {
        Self { history }
    }
}

#[async_trait]
impl ToolHandler for LoadFullHistory {
    fn name(&self) -> &'static str {
        "load_full_history"
    }

    fn description(&self) -> &'static str {
        "Search the full conversation history for past turns. Use for restore/revert/approve \
         operations: e.g. to restore a deleted task, search for its keywords with \
         tools=[\"delete_task\"], read the original_state from the result, and re-create it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_terms": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Keywords matched against message content and recorded tool results (required)"
                },
                "tools": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Also match turns that called any of these tools"
                },
                "limit": {"type": "integer", "description": "Maximum matching messages (default 5)"}
            },
            "required": ["search_terms"]
        })
    }

    async fn call(&self, input: Value) -> ToolEnvelope {
        let terms: Vec<String> = input["search_terms"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let tool_names: Vec<String> = input["tools"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let limit = input["limit"].as_u64().unwrap_or(5) as usize;

        match self.history.search(&terms, &tool_names, limit).await {
            Ok(messages) => {
                let items: Vec<Value> = messages
                    .iter()
                    .map(|m| {
                        json!({
                            "id": m.id,
                            "role": m.role,
                            "content": m.content,
                            "tool_calls": m.tool_calls,
                            "tool_results": m.tool_results,
                            "created_at": m.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                ToolEnvelope::ok(format!("Found {} matching messages", items.len()))
                    .with("messages", Value::Array(items))
            }
            Err(e) => ToolEnvelope::fail(e.to_string()),
        }
    }
}
