//! Gemini Generate API 驱动 — 实现 Google Gemini 特有的请求/响应格式转换
//!
//! Google Gemini `streamGenerateContent` driver. Key differences:
//! - Uses `contents` instead of `messages`, with `parts` instead of `content`.
//! - Roles: `user` and `model` (not `assistant`). System uses `system_instruction`.
//! - `generationConfig` wraps temperature, max_tokens (→ `maxOutputTokens`), etc.
//! - With `alt=sse` every SSE record is a full response chunk; there is no end
//!   sentinel, the stream ends after the chunk carrying `finishReason`.
//! - API key travels in the `x-goog-api-key` header.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::{join_url, normalize_finish_reason, put_opt, Endpoint, ProviderDriver, ProviderRequest};
use crate::pipeline::decode::{parse_record, SseFramer, SseRecord};
use crate::pipeline::{NativeEvent, StreamParser};
use crate::registry::ApiStyle;
use crate::tokens::UsageUpdate;
use crate::types::{Message, Role, Settings};
use crate::Result;

const PROVIDER: &str = "gemini";

/// Google Gemini generateContent API driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiDriver;

impl GeminiDriver {
    /// Separate system instructions from conversation contents.
    fn split_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        let mut system_parts: Vec<Value> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for m in messages {
            let role = match m.role {
                Role::System => {
                    system_parts.push(json!({ "text": m.content }));
                    continue;
                }
                Role::Assistant => "model",
                Role::User | Role::Tool => "user",
            };
            contents.push(json!({
                "role": role,
                "parts": [{ "text": m.content }],
            }));
        }

        let system = (!system_parts.is_empty()).then(|| json!({ "parts": system_parts }));
        (system, contents)
    }
}

impl ProviderDriver for GeminiDriver {
    fn api_style(&self) -> ApiStyle {
        ApiStyle::Gemini
    }

    fn build_request(
        &self,
        conversation: &[Message],
        settings: &Settings,
        endpoint: Endpoint<'_>,
    ) -> Result<ProviderRequest> {
        let (system, contents) = Self::split_messages(conversation);

        let mut generation = Value::Object(Map::new());
        put_opt(&mut generation, "temperature", Some(settings.temperature));
        put_opt(&mut generation, "maxOutputTokens", settings.max_tokens);
        put_opt(&mut generation, "topP", settings.top_p);
        put_opt(&mut generation, "frequencyPenalty", settings.frequency_penalty);
        put_opt(&mut generation, "presencePenalty", settings.presence_penalty);

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation,
        });
        put_opt(&mut body, "system_instruction", system);

        let mut headers = HashMap::new();
        headers.insert("accept".into(), "text/event-stream".into());
        if let Some(key) = endpoint.api_key {
            headers.insert("x-goog-api-key".into(), key.to_string());
        }

        let path = format!("v1beta/models/{}:streamGenerateContent?alt=sse", settings.model);
        Ok(ProviderRequest {
            provider: endpoint.provider_id.to_string(),
            url: join_url(endpoint.base_url, &path),
            headers,
            body,
        })
    }

    fn new_parser(&self) -> Box<dyn StreamParser> {
        Box::new(GeminiStreamParser::default())
    }
}

#[derive(Debug, Default)]
pub struct GeminiStreamParser {
    framer: SseFramer,
    finish_reason: Option<String>,
    done: bool,
    errors: usize,
}

impl GeminiStreamParser {
    fn on_record(&mut self, rec: SseRecord, out: &mut Vec<NativeEvent>) {
        if self.done || rec.data.trim().is_empty() {
            return;
        }
        let Some(v) = parse_record(PROVIDER, &rec.data, &mut self.errors) else {
            return;
        };

        if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
            out.push(NativeEvent::Error {
                code: err.get("status").and_then(Value::as_str).map(String::from),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("upstream error")
                    .to_string(),
            });
            return;
        }

        let candidate = v.pointer("/candidates/0");
        if let Some(parts) = candidate
            .and_then(|c| c.pointer("/content/parts"))
            .and_then(Value::as_array)
        {
            let text: String = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            if !text.is_empty() {
                out.push(NativeEvent::ContentDelta(text));
            }
        }
        if let Some(meta) = v.get("usageMetadata") {
            let update = UsageUpdate {
                prompt_tokens: meta.get("promptTokenCount").and_then(Value::as_u64),
                completion_tokens: meta.get("candidatesTokenCount").and_then(Value::as_u64),
            };
            if !update.is_empty() {
                out.push(NativeEvent::Usage(update));
            }
        }
        if let Some(reason) = candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(Value::as_str)
        {
            self.finish_reason = Some(normalize_finish_reason(reason));
        }
    }
}

impl StreamParser for GeminiStreamParser {
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
