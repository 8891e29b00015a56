//! Running usage totals for one in-flight message.

use super::estimator::estimate_tokens;
use super::pricing::ModelPricing;
use crate::types::UsageSummary;

/// Usage fields reported by a provider. Absent fields leave the running value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageUpdate {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

impl UsageUpdate {
    pub fn both(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none()
    }
}

/// Folds usage updates into final token totals and cost.
///
/// Providers report running totals (Anthropic sends input tokens at message start and
/// cumulative output tokens at the end, Gemini repeats the whole block on every chunk),
/// so the latest reported value per field wins instead of being summed.
#[derive(Debug, Clone)]
pub struct UsageAccumulator {
    pricing: Option<ModelPricing>,
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    estimated: bool,
}

impl UsageAccumulator {
    pub fn new(pricing: Option<ModelPricing>) -> Self {
        Self {
            pricing,
            prompt_tokens: None,
            completion_tokens: None,
            estimated: false,
        }
    }

    pub fn update(&mut self, delta: UsageUpdate) {
        if let Some(p) = delta.prompt_tokens {
            self.prompt_tokens = Some(p);
        }
        if let Some(c) = delta.completion_tokens {
            self.completion_tokens = Some(c);
        }
    }

    /// Whether the provider has reported anything at all.
    pub fn has_reported(&self) -> bool {
        self.prompt_tokens.is_some() || self.completion_tokens.is_some()
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens.unwrap_or(0)
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens.unwrap_or(0)
    }

    /// Fill fields the provider never reported from the estimator.
    pub fn estimate_missing(&mut self, prompt_estimate: u64, completion_text: &str) {
        if self.prompt_tokens.is_none() {
            self.prompt_tokens = Some(prompt_estimate);
            self.estimated = true;
        }
        if self.completion_tokens.is_none() {
            self.completion_tokens = Some(estimate_tokens(completion_text));
            self.estimated = true;
        }
    }

    pub fn finalize(&self) -> UsageSummary {
        let prompt = self.prompt_tokens();
        let completion = self.completion_tokens();
        let cost = self
            .pricing
            .as_ref()
            .map(|p| p.cost(prompt, completion))
            .unwrap_or(0.0);
        UsageSummary {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
            cost,
            estimated: self.estimated,
        }
    }
}
