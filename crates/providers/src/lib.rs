//! LLM provider implementations for voxtask.
//!
//! All providers implement `voxtask_core::LlmProvider` and emit the
//! normalized stream event set; nothing above this crate branches on
//! provider.

pub mod anthropic;
pub mod openai_compat;
pub mod router;
mod sse;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_provider;
