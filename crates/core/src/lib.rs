//! # voxtask core
//!
//! Domain types, traits, and error definitions for the voxtask voice task
//! assistant. This crate has no framework dependencies — it defines the
//! domain model that all other crates implement against.
//!
//! Every subsystem seam is a trait here (LLM provider, tool handler);
//! implementations live in their respective crates and all crates depend
//! inward on this one.

pub mod chat;
pub mod error;
pub mod history;
pub mod provider;
pub mod task;
pub mod tool;
pub mod ui;

// Re-export key types at crate root for ergonomics
pub use chat::{ChatMessage, ChatRole, ToolInvocation, ToolOutcome};
pub use error::{Error, ProviderError, Result, SessionError, StoreError, ToolError};
pub use history::{HistoryMessage, HistoryRole};
pub use provider::{
    EventStream, LlmProvider, StopReason, StreamEvent, StreamRequest, TokenUsage, ToolDefinition,
};
pub use task::{NewTask, Task, TaskFilter, TaskPatch, TaskPriority, TaskStats, TaskStatus};
pub use tool::{ToolEnvelope, ToolHandler, ToolRegistry};
pub use ui::{Choice, SortBy, SortOrder, UiCommand, ViewMode};
