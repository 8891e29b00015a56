//! Anthropic Messages API 驱动 — 实现 Anthropic 特有的请求/响应格式转换
//!
//! Anthropic Messages API driver. Handles the key differences from OpenAI:
//! - System messages are a top-level `system` parameter, not part of `messages`.
//! - Content uses typed blocks: `[{"type": "text", "text": "..."}]`.
//! - Streaming uses typed SSE events (`message_start`, `content_block_delta`,
//!   `message_delta`, `message_stop`).
//! - `max_tokens` is required, not optional; `temperature` tops out at 1.0.

use serde_json::{json, Value};
use std::collections::HashMap;

use super::{join_url, normalize_finish_reason, put_opt, Endpoint, ProviderDriver, ProviderRequest};
use crate::pipeline::decode::{parse_record, SseFramer, SseRecord};
use crate::pipeline::{NativeEvent, StreamParser};
use crate::registry::ApiStyle;
use crate::tokens::UsageUpdate;
use crate::types::{Message, Role, Settings};
use crate::Result;

const PROVIDER: &str = "anthropic";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const API_VERSION: &str = "2023-06-01";
const MAX_TEMPERATURE: f64 = 1.0;

/// Anthropic Messages API driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicDriver;

impl AnthropicDriver {
    /// Extract system message and non-system messages separately.
    /// Anthropic requires system as a top-level param, not in messages array.
    fn split_system_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut turns: Vec<Value> = Vec::new();

        for m in messages {
            let role = match m.role {
                Role::System => {
                    system_parts.push(&m.content);
                    continue;
                }
                Role::Assistant => "assistant",
                Role::User | Role::Tool => "user",
            };
            turns.push(json!({
                "role": role,
                "content": [{ "type": "text", "text": m.content }],
            }));
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, turns)
    }
}

impl ProviderDriver for AnthropicDriver {
    fn api_style(&self) -> ApiStyle {
        ApiStyle::Anthropic
    }

    fn build_request(
        &self,
        conversation: &[Message],
        settings: &Settings,
        endpoint: Endpoint<'_>,
    ) -> Result<ProviderRequest> {
        let (system, turns) = Self::split_system_messages(conversation);

        let mut body = json!({
            "model": settings.model,
            "messages": turns,
            "max_tokens": settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
            "temperature": settings.temperature.min(MAX_TEMPERATURE),
        });
        put_opt(&mut body, "system", system);
        put_opt(&mut body, "top_p", settings.top_p);
        // frequency/presence penalties have no Anthropic equivalent and are dropped

        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), API_VERSION.into());
        headers.insert("accept".into(), "text/event-stream".into());
        if let Some(key) = endpoint.api_key {
            headers.insert("x-api-key".into(), key.to_string());
        }

        Ok(ProviderRequest {
            provider: endpoint.provider_id.to_string(),
            url: join_url(endpoint.base_url, "v1/messages"),
            headers,
            body,
        })
    }

    fn new_parser(&self) -> Box<dyn StreamParser> {
        Box::new(AnthropicStreamParser::default())
    }
}

/// Parser for the Messages API event stream.
#[derive(Debug, Default)]
pub struct AnthropicStreamParser {
    framer: SseFramer,
    stop_reason: Option<String>,
    done: bool,
    errors: usize,
}

impl AnthropicStreamParser {
    fn on_record(&mut self, rec: SseRecord, out: &mut Vec<NativeEvent>) {
        if self.done || rec.data.trim().is_empty() {
            return;
        }
        let Some(v) = parse_record(PROVIDER, &rec.data, &mut self.errors) else {
            return;
        };
        // the JSON `type` is authoritative; the SSE event name is a fallback
        let event_type = v
            .get("type")
            .and_then(Value::as_str)
            .or(rec.event.as_deref())
            .unwrap_or("");

        match event_type {
            "message_start" => {
                let usage = v.pointer("/message/usage");
                let prompt = usage.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64);
                if prompt.is_some() {
                    out.push(NativeEvent::Usage(UsageUpdate {
                        prompt_tokens: prompt,
                        completion_tokens: None,
                    }));
                }
            }
            "content_block_delta" => {
                if let Some(text) = v.pointer("/delta/text").and_then(Value::as_str) {
                    if !text.is_empty() {
                        out.push(NativeEvent::ContentDelta(text.to_string()));
                    }
                }
            }
            "message_delta" => {
                if let Some(r) = v.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.stop_reason = Some(normalize_finish_reason(r));
                }
                let completion = v.pointer("/usage/output_tokens").and_then(Value::as_u64);
                if completion.is_some() {
                    out.push(NativeEvent::Usage(UsageUpdate {
                        prompt_tokens: v.pointer("/usage/input_tokens").and_then(Value::as_u64),
                        completion_tokens: completion,
                    }));
                }
            }
            "message_stop" => {
                self.done = true;
                out.push(NativeEvent::Done {
                    finish_reason: self.stop_reason.take().or_else(|| Some("stop".into())),
                });
            }
            "error" => {
                let err = v.get("error");
                out.push(NativeEvent::Error {
                    code: err
                        .and_then(|e| e.get("type"))
                        .and_then(Value::as_str)
                        .map(String::from),
                    message: err
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or("upstream error")
                        .to_string(),
                });
            }
            // ping, content_block_start, content_block_stop
            _ => {}
        }
    }
}

impl StreamParser for AnthropicStreamParser {
    fn feed(&mut self, bytes: &[u8]) -> Vec<NativeEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        for rec in self.framer.feed(bytes) {
            self.on_record(rec, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<NativeEvent> {
        let mut out = Vec::new();
        for rec in self.framer.finish() {
            self.on_record(rec, &mut out);
        }
        if !self.done && self.stop_reason.is_some() {
            self.done = true;
            out.push(NativeEvent::Done {
                finish_reason: self.stop_reason.take(),
            });
        }
        out
    }

    fn parse_errors(&self) -> usize {
        self.errors
    }
}
