//! OpenAI Chat Completions 驱动 — 兼容 OpenAI 协议的各家厂商通用
//!
//! OpenAI-compatible driver (OpenAI, DeepSeek, Moonshot, ...).
//! - Streams as SSE `data:` records terminated by `data: [DONE]`.
//! - `stream_options.include_usage` asks for a final usage-only chunk before `[DONE]`.
//! - `tool` messages are sent as `user` since no tool-call ids are tracked.

use serde_json::{json, Value};
use std::collections::HashMap;

use super::{join_url, normalize_finish_reason, put_opt, Endpoint, ProviderDriver, ProviderRequest};
use crate::pipeline::decode::{parse_record, SseFramer, SseRecord};
use crate::pipeline::{NativeEvent, StreamParser};
use crate::registry::ApiStyle;
use crate::tokens::UsageUpdate;
use crate::types::{Message, Role, Settings};
use crate::Result;

const PROVIDER: &str = "openai";

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiDriver;

impl OpenAiDriver {
    fn role(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User | Role::Tool => "user",
        }
    }
}

impl ProviderDriver for OpenAiDriver {
    fn api_style(&self) -> ApiStyle {
        ApiStyle::OpenAi
    }

    fn build_request(
        &self,
        conversation: &[Message],
        settings: &Settings,
        endpoint: Endpoint<'_>,
    ) -> Result<ProviderRequest> {
        let messages: Vec<Value> = conversation
            .iter()
            .map(|m| json!({ "role": Self::role(m.role), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": settings.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
            "temperature": settings.temperature,
        });
        put_opt(&mut body, "max_tokens", settings.max_tokens);
        put_opt(&mut body, "top_p", settings.top_p);
        put_opt(&mut body, "frequency_penalty", settings.frequency_penalty);
        put_opt(&mut body, "presence_penalty", settings.presence_penalty);

        let mut headers = HashMap::new();
        headers.insert("accept".into(), "text/event-stream".into());
        if let Some(key) = endpoint.api_key {
            headers.insert("authorization".into(), format!("Bearer {}", key));
        }

        Ok(ProviderRequest {
            provider: endpoint.provider_id.to_string(),
            url: join_url(endpoint.base_url, "chat/completions"),
            headers,
            body,
        })
    }

    fn new_parser(&self) -> Box<dyn StreamParser> {
        Box::new(OpenAiStreamParser::default())
    }
}

/// Parser for OpenAI-style SSE chunks.
#[derive(Debug, Default)]
pub struct OpenAiStreamParser {
    framer: SseFramer,
    finish_reason: Option<String>,
    done: bool,
    errors: usize,
}

impl OpenAiStreamParser {
    fn on_record(&mut self, rec: SseRecord, out: &mut Vec<NativeEvent>) {
        if self.done {
            return;
        }
        let data = rec.data.trim();
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.done = true;
            out.push(NativeEvent::Done {
                finish_reason: self.finish_reason.take(),
            });
            return;
        }
        let Some(v) = parse_record(PROVIDER, data, &mut self.errors) else {
            return;
        };

        if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
            let code = err
                .get("code")
                .and_then(Value::as_str)
                .or_else(|| err.get("type").and_then(Value::as_str))
                .map(String::from);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("upstream error")
                .to_string();
            out.push(NativeEvent::Error { code, message });
            return;
        }

        if let Some(text) = v.pointer("/choices/0/delta/content").and_then(Value::as_str) {
            if !text.is_empty() {
                out.push(NativeEvent::ContentDelta(text.to_string()));
            }
        }
        if let Some(reason) = v.pointer("/choices/0/finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(normalize_finish_reason(reason));
        }
        if let Some(usage) = v.get("usage").filter(|u| u.is_object()) {
            let update = UsageUpdate {
                prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
                completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
            };
            if !update.is_empty() {
                out.push(NativeEvent::Usage(update));
            }
        }
    }
}

impl StreamParser for OpenAiStreamParser {
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
        // Some compatible servers close without [DONE]; a seen finish_reason is enough.
        if !self.done && self.finish_reason.is_some() {
            self.done = true;
            out.push(NativeEvent::Done {
                finish_reason: self.finish_reason.take(),
            });
        }
        out
    }

    fn parse_errors(&self) -> usize {
        self.errors
    }
}
