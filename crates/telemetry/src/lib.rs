//! Cost accounting for voxtask.
//!
//! A per-model pricing table (four non-overlapping rates: input, cache
//! write, cache read, output) and the cost computation the agent loop uses
//! to persist one cost record per invocation.

pub mod pricing;

pub use pricing::{CostBreakdown, ModelPricing, PricingTable};
