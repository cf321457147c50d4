//! Static per-model USD pricing, used to compute the `X-Cost-USD` response header.
//!
//! Rates are USD per 1M tokens, matching how upstream providers publish pricing.
//! Unknown models fall back to a conservative default rather than failing the
//! request — a missing price should never block a response.

use crate::cache::TokenCounts;

/// `(input $/1M tokens, output $/1M tokens)` for a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRate {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

const DEFAULT_RATE: ModelRate = ModelRate {
    input_per_1m: 1.00,
    output_per_1m: 3.00,
};

/// Known model-prefix rates, checked longest-prefix-first. New models are priced
/// via [`DEFAULT_RATE`] until added here.
const RATES: &[(&str, ModelRate)] = &[
    ("gpt-4o-mini", ModelRate { input_per_1m: 0.15, output_per_1m: 0.60 }),
    ("gpt-4o", ModelRate { input_per_1m: 2.50, output_per_1m: 10.00 }),
    ("gpt-4-turbo", ModelRate { input_per_1m: 10.00, output_per_1m: 30.00 }),
    ("gpt-4", ModelRate { input_per_1m: 30.00, output_per_1m: 60.00 }),
    ("gpt-3.5-turbo", ModelRate { input_per_1m: 0.50, output_per_1m: 1.50 }),
    ("text-embedding-3-small", ModelRate { input_per_1m: 0.02, output_per_1m: 0.0 }),
    ("text-embedding-3-large", ModelRate { input_per_1m: 0.13, output_per_1m: 0.0 }),
    ("claude-3-5-sonnet", ModelRate { input_per_1m: 3.00, output_per_1m: 15.00 }),
    ("claude-3-opus", ModelRate { input_per_1m: 15.00, output_per_1m: 75.00 }),
    ("claude-3-haiku", ModelRate { input_per_1m: 0.25, output_per_1m: 1.25 }),
];

/// Looks up the rate for `model`, matching the longest known prefix
/// case-insensitively, else [`DEFAULT_RATE`].
pub fn rate_for_model(model: &str) -> ModelRate {
    let model = model.to_lowercase();
    RATES
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_RATE)
}

/// The model identifiers this gateway has a specific rate for, in table order; used
/// to populate `GET /v1/models`.
pub fn known_models() -> Vec<&'static str> {
    RATES.iter().map(|(id, _)| *id).collect()
}

/// Computes the dollar cost of a request's token usage at `model`'s rate.
pub fn estimate_cost_usd(model: &str, tokens: TokenCounts) -> f64 {
    let rate = rate_for_model(model);
    (tokens.input as f64 / 1_000_000.0) * rate.input_per_1m
        + (tokens.output as f64 / 1_000_000.0) * rate.output_per_1m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_own_rate() {
        let rate = rate_for_model("gpt-4o-2024-08-06");
        assert_eq!(rate.input_per_1m, 2.50);
    }

    #[test]
    fn longest_prefix_wins_over_shorter_overlapping_prefix() {
        let rate = rate_for_model("gpt-4o-mini-2024-07-18");
        assert_eq!(rate.input_per_1m, 0.15);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        assert_eq!(rate_for_model("some-future-model"), DEFAULT_RATE);
    }

    #[test]
    fn cost_scales_linearly_with_tokens() {
        let tokens = TokenCounts { input: 1_000_000, output: 1_000_000, total: 2_000_000 };
        let cost = estimate_cost_usd("gpt-4o", tokens);
        assert!((cost - 12.50).abs() < 1e-9);
    }

    #[test]
    fn model_name_matching_is_case_insensitive() {
        let rate = rate_for_model("GPT-4O");
        assert_eq!(rate.input_per_1m, 2.50);
    }
}
