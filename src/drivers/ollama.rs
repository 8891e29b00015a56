//! Ollama 本地模型驱动 — NDJSON 流式格式
//!
//! Ollama `/api/chat` driver. All four roles are native. Sampling knobs live under
//! `options`, with `num_predict` standing in for max_tokens. The response is NDJSON:
//! one JSON object per line, the last one carrying `"done": true` and the token counts.

use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::{join_url, normalize_finish_reason, put_opt, Endpoint, ProviderDriver, ProviderRequest};
use crate::pipeline::decode::{parse_record, LineBuffer};
use crate::pipeline::{NativeEvent, StreamParser};
use crate::registry::ApiStyle;
use crate::tokens::UsageUpdate;
use crate::types::{Message, Settings};
use crate::Result;

const PROVIDER: &str = "ollama";

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaDriver;

impl ProviderDriver for OllamaDriver {
    fn api_style(&self) -> ApiStyle {
        ApiStyle::Ollama
    }

    fn build_request(
        &self,
        conversation: &[Message],
        settings: &Settings,
        endpoint: Endpoint<'_>,
    ) -> Result<ProviderRequest> {
        let messages: Vec<Value> = conversation
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut options = Value::Object(Map::new());
        put_opt(&mut options, "temperature", Some(settings.temperature));
        put_opt(&mut options, "num_predict", settings.max_tokens);
        put_opt(&mut options, "top_p", settings.top_p);
        put_opt(&mut options, "frequency_penalty", settings.frequency_penalty);
        put_opt(&mut options, "presence_penalty", settings.presence_penalty);

        let body = json!({
            "model": settings.model,
            "messages": messages,
            "stream": true,
            "options": options,
        });

        let mut headers = HashMap::new();
        headers.insert("accept".into(), "application/x-ndjson".into());
        // local servers are keyless; a reverse proxy in front may still want a bearer
        if let Some(key) = endpoint.api_key {
            headers.insert("authorization".into(), format!("Bearer {}", key));
        }

        Ok(ProviderRequest {
            provider: endpoint.provider_id.to_string(),
            url: join_url(endpoint.base_url, "api/chat"),
            headers,
            body,
        })
    }

    fn new_parser(&self) -> Box<dyn StreamParser> {
        Box::new(OllamaStreamParser::default())
    }
}

/// NDJSON parser for `/api/chat`.
#[derive(Debug, Default)]
pub struct OllamaStreamParser {
    lines: LineBuffer,
    done: bool,
    errors: usize,
}

impl OllamaStreamParser {
    fn on_line(&mut self, line: &str, out: &mut Vec<NativeEvent>) {
        let line = line.trim();
        if self.done || line.is_empty() {
            return;
        }
        let Some(v) = parse_record(PROVIDER, line, &mut self.errors) else {
            return;
        };

        if let Some(message) = v.get("error").and_then(Value::as_str) {
            out.push(NativeEvent::Error {
                code: None,
                message: message.to_string(),
            });
            return;
        }
        if let Some(text) = v.pointer("/message/content").and_then(Value::as_str) {
            if !text.is_empty() {
                out.push(NativeEvent::ContentDelta(text.to_string()));
            }
        }
        if v.get("done").and_then(Value::as_bool) == Some(true) {
            let update = UsageUpdate {
                prompt_tokens: v.get("prompt_eval_count").and_then(Value::as_u64),
                completion_tokens: v.get("eval_count").and_then(Value::as_u64),
            };
            if !update.is_empty() {
                out.push(NativeEvent::Usage(update));
            }
            self.done = true;
            let reason = v
                .get("done_reason")
                .and_then(Value::as_str)
                .map(normalize_finish_reason)
                .unwrap_or_else(|| "stop".into());
            out.push(NativeEvent::Done {
                finish_reason: Some(reason),
            });
        }
    }
}

impl StreamParser for OllamaStreamParser {
    fn feed(&mut self, bytes: &[u8]) -> Vec<NativeEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.lines.push(bytes);
        while let Some(line) = self.lines.next_line() {
            self.on_line(&line, &mut out);
        }
        out
    }

    fn finish(&mut self) -> Vec<NativeEvent> {
        let mut out = Vec::new();
        if let Some(line) = self.lines.take_rest() {
            self.on_line(&line, &mut out);
        }
        out
    }

    fn parse_errors(&self) -> usize {
        self.errors
    }
}
