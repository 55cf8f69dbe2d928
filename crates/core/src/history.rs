//! Conversation history records.
//!
//! The history log is append-only and process-global (no session filter —
//! a deliberate contract; the read path is isolated behind the history
//! gateway so a future `session_id` filter is a single-call-site change).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chat::{ToolInvocation, ToolOutcome};

/// Roles stored in the history log. Tool-result messages are stored with
/// role `user` by convention (see [`crate::chat`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

impl HistoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for HistoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown history role: {other}")),
        }
    }
}

/// A persisted conversation message. Ordering is chronological by `id`
/// and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub role: HistoryRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolOutcome>>,
    pub created_at: DateTime<Utc>,
}

impl HistoryMessage {
    /// Whether this is a synthetic tool-result carrier.
    pub fn is_tool_result(&self) -> bool {
        self.role == HistoryRole::User
            && self.tool_results.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Whether this assistant turn requested tools.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: HistoryRole) -> HistoryMessage {
        HistoryMessage {
            id: 1,
            role,
            content: String::new(),
            tool_calls: None,
            tool_results: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tool_result_detection() {
        let mut m = msg(HistoryRole::User);
        assert!(!m.is_tool_result());
        m.tool_results = Some(vec![ToolOutcome {
            tool_use_id: "t1".into(),
            content: "{}".into(),
        }]);
        assert!(m.is_tool_result());
    }

    #[test]
    fn tool_call_detection() {
        let mut m = msg(HistoryRole::Assistant);
        assert!(!m.has_tool_calls());
        m.tool_calls = Some(vec![]);
        assert!(!m.has_tool_calls(), "empty list is not a tool call turn");
        m.tool_calls = Some(vec![ToolInvocation {
            id: "t1".into(),
            name: "create_task".into(),
            input: serde_json::json!({}),
        }]);
        assert!(m.has_tool_calls());
    }

    #[test]
    fn role_parsing_rejects_system() {
        assert!("system".parse::<HistoryRole>().is_err());
    }
}
