//! Token and cost estimation.
//!
//! These are heuristics for display purposes. They are not validated
//! against the server's tokenizer and prices drift; whenever the API
//! reports real usage, prefer that.

use serde::{Deserialize, Serialize};

/// Average characters per token assumed by [`estimate_tokens`].
const CHARS_PER_TOKEN: f64 = 3.5;

/// Per-model multiplier applied to the raw character estimate.
fn token_multiplier(model: &str) -> f64 {
    match model {
        "gpt-4" | "gpt-4-turbo" | "gpt-4o" | "gpt-4o-mini" | "o1-preview" | "o1-mini" => 0.75,
        _ => 1.0,
    }
}

/// Estimate the token count of `text` for `model`.
///
/// Empty text is zero tokens.
#[must_use]
pub fn estimate_tokens(text: &str, model: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let base = (text.chars().count() as f64 / CHARS_PER_TOKEN).ceil();
    (base * token_multiplier(model)).ceil() as u64
}

/// Price per 1K tokens, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Prompt price per 1K tokens.
    pub input: f64,
    /// Completion price per 1K tokens.
    pub output: f64,
}

impl ModelPricing {
    /// Look up pricing for a model; unknown models use gpt-3.5-turbo rates.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        let (input, output) = match model {
            "gpt-4o" => (0.005, 0.015),
            "gpt-4o-mini" => (0.000_15, 0.000_6),
            "gpt-4-turbo" => (0.01, 0.03),
            "gpt-4" => (0.03, 0.06),
            "o1-preview" => (0.015, 0.06),
            "o1-mini" => (0.003, 0.012),
            _ => (0.001_5, 0.002),
        };
        Self { input, output }
    }

    /// Cost of a request with the given token counts.
    #[must_use]
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> CostEstimate {
        let input = input_tokens as f64 / 1000.0 * self.input;
        let output = output_tokens as f64 / 1000.0 * self.output;
        CostEstimate {
            input,
            output,
            total: input + output,
        }
    }
}

/// Estimated cost breakdown in USD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Prompt cost.
    pub input: f64,
    /// Completion cost.
    pub output: f64,
    /// Sum of both.
    pub total: f64,
}

/// Estimate the cost of a request for `model`.
#[must_use]
pub fn calculate_cost(input_tokens: u64, output_tokens: u64, model: &str) -> CostEstimate {
    ModelPricing::for_model(model).cost(input_tokens, output_tokens)
}
