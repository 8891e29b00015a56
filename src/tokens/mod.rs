//! Token 估算与成本统计模块：在流式输出过程中累计用量与费用。
//!
//! # Token Estimation and Cost Accounting
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`estimate_tokens`] | Heuristic token count used when a provider omits usage |
//! | [`ModelPricing`] | Per-1000-token rates for one model |
//! | [`CostEstimate`] | Cost breakdown for a token pair |
//! | [`UsageAccumulator`] | Folds reported usage into final totals and cost |
//!
//! ## Example
//!
//! ```rust
//! use ai_stream_gateway::tokens::{ModelPricing, UsageAccumulator, UsageUpdate};
//!
//! let mut acc = UsageAccumulator::new(Some(ModelPricing::new("m", 0.0015, 0.002)));
//! acc.update(UsageUpdate::both(1000, 500));
//! let summary = acc.finalize();
//! assert!((summary.cost - 0.0025).abs() < 1e-12);
//! ```

mod estimator;
mod pricing;
mod usage;

pub use estimator::{estimate_conversation, estimate_tokens};
pub use pricing::{CostEstimate, ModelPricing};
pub use usage::{UsageAccumulator, UsageUpdate};
