//! Provider trait — the abstraction over streaming LLM backends.
//!
//! A provider translates one provider-agnostic request into its own wire
//! protocol and emits the normalized event set below. Upstream code never
//! sees provider-shaped chunks and never branches on provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::chat::ChatMessage;
use crate::error::ProviderError;

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input contract.
    pub input_schema: serde_json::Value,
}

/// Why a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Error,
}

/// Token accounting for one stream. The four counters are non-overlapping:
/// `input_tokens` covers only uncached input; cache reads and writes are
/// reported separately so the cost calculator neither double-counts nor
/// under-counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
}

impl TokenUsage {
    /// Fold another usage report into this one (accumulation across
    /// iterations of an agent invocation).
    pub fn absorb(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_write_tokens += other.cache_write_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Normalized streaming events emitted by every provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta { text: String },

    /// The model began a tool invocation; arguments follow as deltas.
    ToolCallStart { id: String, name: String },

    /// A fragment of the streamed argument JSON. Providers buffer these
    /// internally; the fragment is surfaced for observability only.
    ToolCallArgsDelta { id: String, fragment: String },

    /// Arguments fully assembled and parsed; ready to dispatch.
    ToolCallComplete {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Final accounting for the stream (may arrive before `Stop`).
    Usage { usage: TokenUsage },

    /// The stream ended.
    Stop { reason: StopReason },
}

/// A provider-agnostic streaming request.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    /// System prompt; providers place it wherever their protocol wants it.
    pub system: String,
    pub max_output_tokens: u32,
}

/// The receiver half of a provider stream. Transport failures arrive as
/// `Err` items; the channel closing without a `Stop` means the stream was
/// severed.
pub type EventStream = mpsc::Receiver<Result<StreamEvent, ProviderError>>;

/// The streaming LLM provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, e.g. "anthropic".
    fn name(&self) -> &str;

    /// The model this provider instance targets.
    fn model(&self) -> &str;

    /// Open a stream for the given request.
    async fn stream(&self, request: StreamRequest) -> Result<EventStream, ProviderError>;
}
