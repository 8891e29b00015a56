//! Provider 驱动抽象层 — 通过 trait 实现多厂商 API 适配的动态分发
//!
//! Provider driver abstraction layer. Each [`ApiStyle`] has one driver that knows two
//! things about its provider: how to shape a conversation into a request
//! ([`ProviderDriver::build_request`]) and how to read the streaming response back
//! ([`ProviderDriver::new_parser`]). The dispatcher holds a `Box<dyn ProviderDriver>`
//! and never looks at provider JSON itself.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::pipeline::StreamParser;
use crate::registry::ApiStyle;
use crate::tokens::estimate_tokens;
use crate::types::{Message, Role, Settings};
use crate::Result;

pub use anthropic::AnthropicDriver;
pub use gemini::GeminiDriver;
pub use ollama::OllamaDriver;
pub use openai::OpenAiDriver;

/// Fully-formed upstream request, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Provider id, for logging and error messages.
    pub provider: String,
    /// Target URL (base_url + provider path).
    pub url: String,
    /// Request headers, including auth.
    pub headers: HashMap<String, String>,
    /// JSON request body.
    pub body: Value,
}

/// Where and as whom to send a request.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub provider_id: &'a str,
    pub base_url: &'a str,
    pub api_key: Option<&'a str>,
}

/// Core trait for provider-specific API adaptation.
///
/// The trait is object-safe; the dispatcher selects an implementation with
/// [`create_driver`] from the descriptor's `api_style`.
pub trait ProviderDriver: Send + Sync + std::fmt::Debug {
    /// API style this driver implements.
    fn api_style(&self) -> ApiStyle;

    /// Build a provider-specific streaming request. Message order is preserved;
    /// roles the provider lacks are folded into ones it has.
    fn build_request(
        &self,
        conversation: &[Message],
        settings: &Settings,
        endpoint: Endpoint<'_>,
    ) -> Result<ProviderRequest>;

    /// Fresh parser for one response body.
    fn new_parser(&self) -> Box<dyn StreamParser>;
}

/// Factory function to create the appropriate driver from an API style.
pub fn create_driver(api_style: ApiStyle) -> Box<dyn ProviderDriver> {
    match api_style {
        ApiStyle::OpenAi => Box::new(OpenAiDriver),
        ApiStyle::Anthropic => Box::new(AnthropicDriver),
        ApiStyle::Gemini => Box::new(GeminiDriver),
        ApiStyle::Ollama => Box::new(OllamaDriver),
    }
}

/// Maps provider-specific finish reasons onto `stop`, `length`, `content_filter`
/// and `tool_calls`. Unknown reasons are passed through lowercased.
pub fn normalize_finish_reason(raw: &str) -> String {
    match raw {
        "stop" | "end_turn" | "stop_sequence" | "STOP" | "FINISH_REASON_STOP" => "stop".into(),
        "length" | "max_tokens" | "MAX_TOKENS" => "length".into(),
        "content_filter" | "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
        | "SPII" | "refusal" => "content_filter".into(),
        "tool_calls" | "tool_use" | "function_call" => "tool_calls".into(),
        other => other.to_ascii_lowercase(),
    }
}

/// Drop the oldest turns until the estimated prompt fits `context_window` minus the
/// output reservation.
///
/// A turn is a user message plus the assistant/tool messages that answer it, so the
/// kept history never opens on an orphaned reply. The output reservation is capped at
/// half the window. System prompts and the most recent user message are always kept;
/// if they alone exceed the budget the request is sent as-is and the provider decides.
pub fn truncate_history(
    conversation: &[Message],
    context_window: u32,
    max_output_tokens: Option<u32>,
) -> Vec<Message> {
    let reserve = max_output_tokens.unwrap_or(0).min(context_window / 2);
    let budget = context_window.saturating_sub(reserve) as u64;
    let last_user = conversation
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(conversation.len());
    let costs: Vec<u64> = conversation
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .collect();
    let mut total: u64 = costs.iter().sum();
    let mut keep = vec![true; conversation.len()];

    let mut idx = 0;
    while total > budget && idx < last_user {
        if conversation[idx].role == Role::System {
            idx += 1;
            continue;
        }
        let mut end = idx + 1;
        while end < last_user && !matches!(conversation[end].role, Role::User | Role::System) {
            end += 1;
        }
        for i in idx..end {
            keep[i] = false;
            total -= costs[i];
        }
        idx = end;
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        debug!(dropped, budget, estimated = total, "truncated conversation history");
    }
    conversation
        .iter()
        .zip(keep)
        .filter_map(|(m, k)| k.then(|| m.clone()))
        .collect()
}

/// `base` + `path` without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Inserts the optional sampling fields under their provider-specific names.
pub(crate) fn put_opt<T: serde::Serialize>(target: &mut Value, key: &str, value: Option<T>) {
    if let (Some(v), Value::Object(map)) = (value, target) {
        map.insert(key.to_string(), serde_json::json!(v));
    }
}
