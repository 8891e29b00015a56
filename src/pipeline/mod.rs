//! 流水线处理模块：把上游原始字节增量解析为供应商原生事件。
//!
//! # Stream Parsing Layer
//!
//! Turns the raw bytes of a streaming HTTP response into discrete provider-native
//! events. Framing (lines, SSE fields) is shared; the meaning of each record is
//! provider-specific and lives next to that provider's request builder in
//! [`crate::drivers`].
//!
//! ## Pipeline Stages
//!
//! ```text
//! Raw Bytes → LineBuffer → SseFramer / NDJSON → StreamParser → NativeEvent
//!     │            │              │                  │
//!   HTTP      carries tail    event:/data:      provider JSON
//!   chunks    across feeds    records           semantics
//! ```
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StreamParser`] | Per-provider incremental parser trait |
//! | [`NativeEvent`] | Provider-native event, before unification |
//! | [`decode::LineBuffer`] | Byte buffer yielding complete lines |
//! | [`decode::SseFramer`] | SSE record framing on top of lines |
//!
//! Parsers are chunk-boundary independent: feeding a response in one chunk or split
//! at arbitrary byte offsets yields the same event sequence.

pub mod decode;

use crate::tokens::UsageUpdate;


/// Provider-native event produced by a [`StreamParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    /// A piece of generated text.
    ContentDelta(String),
    /// Usage as reported by the provider (running totals; absent fields unknown).
    Usage(UsageUpdate),
    /// End-of-stream sentinel, with the normalized finish reason when one was reported.
    Done { finish_reason: Option<String> },
    /// Provider-reported error inside an otherwise successful HTTP response.
    Error {
        code: Option<String>,
        message: String,
    },
}

/// Incremental, line-oriented parser for one provider's streaming format.
///
/// `feed` may return an empty vector when the chunk holds no complete record.
/// Unconsumed trailing bytes are carried to the next call. Once the sentinel has been
/// seen, further input is ignored.
pub trait StreamParser: Send {
    fn feed(&mut self, bytes: &[u8]) -> Vec<NativeEvent>;

    /// Flush at upstream EOF (a final record without trailing newline).
    fn finish(&mut self) -> Vec<NativeEvent>;

    /// Number of malformed records skipped so far.
    fn parse_errors(&self) -> usize;
}
