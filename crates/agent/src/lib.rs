//! The voxtask agent loop.
//!
//! One invocation per voice turn:
//!
//! 1. Load the recent history prefix (clearing the log if it is corrupted)
//! 2. Append the user query
//! 3. Stream the LLM, forwarding text deltas live
//! 4. Dispatch requested tools, feeding results back, up to the iteration cap
//! 5. Persist the turn and the aggregated token cost
//!
//! Cancellation (interrupt or teardown) is honored at every suspension
//! point; a cancelled invocation persists nothing beyond the user query.

pub mod loop_runner;
pub mod stream_event;
pub mod system_prompt;

pub use loop_runner::{AgentLoop, TurnOutcome};
pub use stream_event::AgentEvent;
pub use system_prompt::build_system_prompt;
