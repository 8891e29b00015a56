//! Stream framing (Bytes -> lines -> records)
//!
//! This module only knows *formats* (newline-delimited text, SSE fields). What a
//! record means is decided by the provider parsers.

use serde_json::Value;
use tracing::warn;

/// Buffers raw bytes and yields complete `\n`-terminated lines.
///
/// Bytes are kept undecoded until a full line is available, so a multi-byte UTF-8
/// character split across two chunks is reassembled intact. A trailing `\r` is
/// stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let idx = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=idx).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Remaining bytes at EOF, if any non-blank text is left.
    pub fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let s = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        if s.trim().is_empty() {
            None
        } else {
            Some(s)
        }
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// One SSE record: a `data:` payload plus the most recent `event:` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

/// Minimal SSE framer:
/// - every `data:` line is dispatched as one record
/// - `event:` names apply to the following data lines until a blank line
/// - comment lines (`:`) and other fields (`id:`, `retry:`) are ignored
#[derive(Debug, Default)]
pub struct SseFramer {
    lines: LineBuffer,
    event: Option<String>,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseRecord> {
        self.lines.push(bytes);
        let mut out = Vec::new();
        while let Some(line) = self.lines.next_line() {
            if let Some(rec) = self.on_line(&line) {
                out.push(rec);
            }
        }
        out
    }

    pub fn finish(&mut self) -> Vec<SseRecord> {
        let mut out = Vec::new();
        if let Some(line) = self.lines.take_rest() {
            if let Some(rec) = self.on_line(&line) {
                out.push(rec);
            }
        }
        out
    }

    fn on_line(&mut self, line: &str) -> Option<SseRecord> {
        if line.is_empty() {
            self.event = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => {
                self.event = Some(value.to_string());
                None
            }
            "data" => Some(SseRecord {
                event: self.event.clone(),
                data: value.to_string(),
            }),
            _ => None,
        }
    }
}

/// Parse one record payload as JSON; malformed payloads are logged and counted, not fatal.
pub fn parse_record(provider: &str, raw: &str, errors: &mut usize) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => Some(v),
        Err(e) => {
            *errors += 1;
            warn!(
                provider,
                error = %e,
                record = truncate_for_log(raw),
                "skipping malformed stream record"
            );
            None
        }
    }
}

fn truncate_for_log(raw: &str) -> &str {
    match raw.char_indices().nth(120) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
