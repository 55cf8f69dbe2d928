//! Built-in pricing table for the supported LLM models.
//!
//! Prices are in USD per 1 million tokens. Each model carries four rates:
//! regular input, cache write, cache read, and output. The four token
//! counters are non-overlapping, so the cost is a plain weighted sum.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use voxtask_core::TokenUsage;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_m: f64,
    pub cache_write_per_m: f64,
    pub cache_read_per_m: f64,
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input: f64, cache_write: f64, cache_read: f64, output: f64) -> Self {
        Self {
            input_per_m: input,
            cache_write_per_m: cache_write,
            cache_read_per_m: cache_read,
            output_per_m: output,
        }
    }

    /// Compute the cost breakdown for a usage report.
    pub fn cost(&self, usage: &TokenUsage) -> CostBreakdown {
        let input_cost = usage.input_tokens as f64 / 1_000_000.0 * self.input_per_m
            + usage.cache_write_tokens as f64 / 1_000_000.0 * self.cache_write_per_m
            + usage.cache_read_tokens as f64 / 1_000_000.0 * self.cache_read_per_m;
        let output_cost = usage.output_tokens as f64 / 1_000_000.0 * self.output_per_m;
        CostBreakdown {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

/// Computed cost of one invocation, in USD.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Regular input + cache write + cache read.
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Pricing table with built-in defaults and optional overrides.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // Anthropic: cache write = +25% of input, cache read = 10%.
        prices.insert(
            "claude-sonnet-4".into(),
            ModelPricing::new(3.0, 3.75, 0.30, 15.0),
        );
        prices.insert(
            "claude-opus-4".into(),
            ModelPricing::new(15.0, 18.75, 1.50, 75.0),
        );
        prices.insert(
            "claude-3-5-haiku".into(),
            ModelPricing::new(0.8, 1.0, 0.08, 4.0),
        );

        // OpenAI: cached input at 50% of base, no separate write premium.
        prices.insert("gpt-4o".into(), ModelPricing::new(2.5, 2.5, 1.25, 10.0));
        prices.insert(
            "gpt-4o-mini".into(),
            ModelPricing::new(0.15, 0.15, 0.075, 0.6),
        );

        Self { prices }
    }

    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Apply overrides from a JSON map of model → [input, cache_write,
    /// cache_read, output].
    pub fn apply_overrides(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let raw: HashMap<String, [f64; 4]> = serde_json::from_str(json)?;
        for (model, [input, write, read, output]) in raw {
            self.prices
                .insert(model, ModelPricing::new(input, write, read, output));
        }
        Ok(())
    }

    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    /// Look up pricing for a model. Tries an exact match first, then the
    /// longest key that is a prefix of the model name — provider responses
    /// usually carry a version suffix ("claude-sonnet-4-20250514").
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        if let Some(p) = self.prices.get(model) {
            return Some(*p);
        }

        let model_lower = model.to_lowercase();
        self.prices
            .iter()
            .filter(|(key, _)| model_lower.starts_with(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
    }

    /// Cost for a model invocation; zero when the model is unknown.
    pub fn compute_cost(&self, model: &str, usage: &TokenUsage) -> CostBreakdown {
        self.get(model)
            .map(|p| p.cost(usage))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
