//! Provider-bound chat messages.
//!
//! These are the value objects the agent loop composes and the LLM adapters
//! translate into provider wire formats. Tool results travel in `user`-role
//! messages so every provider protocol accepts them as input.

use serde::{Deserialize, Serialize};

/// Chat roles the providers accept as conversation input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned call id; ties the result back to the call.
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// The recorded outcome of a tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_use_id: String,
    /// Serialized envelope JSON.
    pub content: String,
}

/// One message in a provider-bound conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolOutcome>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// An assistant turn that requested tools (optionally with text).
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_results: Vec::new(),
        }
    }

    /// The synthetic user turn carrying tool outputs back to the model.
    pub fn tool_results(results: Vec<ToolOutcome>) -> Self {
        Self {
            role: ChatRole::User,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_results: results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_carry_user_role() {
        let msg = ChatMessage::tool_results(vec![ToolOutcome {
            tool_use_id: "toolu_1".into(),
            content: "{\"success\":true}".into(),
        }]);
        assert_eq!(msg.role, ChatRole::User);
        assert!(msg.content.is_empty());
        assert_eq!(msg.tool_results.len(), 1);
    }

    #[test]
    fn serialization_skips_empty_vecs() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_results"));
    }
}
