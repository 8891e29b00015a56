//! Unified streaming events: the gateway's only outbound contract.

use crate::error_code::ErrorKind;
use serde::{Deserialize, Serialize};

/// Final usage and cost for one assembled message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Advisory cost in the descriptor's currency; 0.0 when rates are unknown.
    pub cost: f64,
    /// True when at least one side was derived by the token estimator.
    #[serde(default)]
    pub estimated: bool,
}

/// Unified streaming event enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum UnifiedEvent {
    /// Partial content delta (text streaming)
    #[serde(rename = "ContentDelta")]
    ContentDelta { text: String },

    /// Usage reported by the provider mid-stream (running totals)
    #[serde(rename = "Usage")]
    Usage {
        prompt_tokens: u64,
        completion_tokens: u64,
    },

    /// Normal completion; always the last event of a successful stream
    #[serde(rename = "Done")]
    Done {
        finish_reason: String,
        usage: UsageSummary,
    },

    /// Terminal failure; always the last event of a failed stream
    #[serde(rename = "Failed")]
    Failed {
        kind: ErrorKind,
        message: String,
        retryable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
}

impl UnifiedEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnifiedEvent::Done { .. } | UnifiedEvent::Failed { .. })
    }

    /// Build the terminal event for an error.
    pub fn failed(err: &crate::Error) -> Self {
        let kind = err.kind();
        UnifiedEvent::Failed {
            kind,
            message: err.to_string(),
            retryable: kind.caller_retryable(),
            retry_after_ms: err.retry_after_ms(),
        }
    }
}
