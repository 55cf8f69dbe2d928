//! Agent-level streaming events.
//!
//! `AgentEvent` is the semantic event stream one invocation emits; the
//! session orchestrator wraps each one as `{"type": "agent_event", "data": …}`
//! and forwards it to the client.
//!
//! - `thinking`        — free-text progress hint
//! - `tool_use_start`  — the model began a tool invocation
//! - `tool_use`        — arguments assembled, about to dispatch
//! - `tool_result`     — the normalized envelope (may carry `ui_command`)
//! - `text`            — an incremental assistant text delta, not cumulative
//! - `done`            — end of turn
//! - `error`           — the invocation failed after retries

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking { content: String },

    ToolUseStart { tool: String },

    ToolUse {
        tool: String,
        input: serde_json::Value,
    },

    ToolResult {
        tool: String,
        result: serde_json::Value,
    },

    Text { content: String },

    Done,

    Error { message: String },
}
