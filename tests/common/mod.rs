//! Shared fixtures: a scripted fake upstream and dispatcher constructors.

#![allow(dead_code)]

use ai_stream_gateway::drivers::ProviderRequest;
use ai_stream_gateway::transport::http::remote_error;
use ai_stream_gateway::transport::{ByteStream, TransportError, Upstream};
use ai_stream_gateway::{
    Dispatcher, Error, GatewayConfig, Registry, RetryConfig, StreamOutcome, UnifiedEvent,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the fake upstream does on one `open` call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Serve these chunks, then a clean EOF.
    Body(Vec<Bytes>),
    /// Serve these chunks, then fail mid-body.
    BodyThenDrop(Vec<Bytes>),
    /// Serve these chunks, then never send anything again.
    Stall(Vec<Bytes>),
    /// Connection accepted but no response headers ever arrive.
    Hang,
    /// Connection refused.
    Refuse,
    /// Non-2xx response with an optional Retry-After (ms).
    Status(u16, &'static str, Option<u64>),
}

pub fn body(s: &str) -> Step {
    Step::Body(vec![Bytes::copy_from_slice(s.as_bytes())])
}

/// Split `s` into `n`-byte chunks, ignoring UTF-8 boundaries.
pub fn chunked(s: &str, n: usize) -> Vec<Bytes> {
    s.as_bytes().chunks(n).map(Bytes::copy_from_slice).collect()
}

#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedUpstream {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn open(&self, request: &ProviderRequest) -> ai_stream_gateway::Result<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Refuse);
        match step {
            Step::Body(chunks) => Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok)))),
            Step::BodyThenDrop(chunks) => Ok(Box::pin(
                stream::iter(chunks.into_iter().map(Ok)).chain(stream::once(async {
                    Err(Error::Transport(TransportError::Body(
                        "connection reset by peer".into(),
                    )))
                })),
            )),
            Step::Stall(chunks) => Ok(Box::pin(
                stream::iter(chunks.into_iter().map(Ok)).chain(stream::pending()),
            )),
            Step::Hang => futures::future::pending().await,
            Step::Refuse => Err(Error::Transport(TransportError::Connection(
                "connection refused".into(),
            ))),
            Step::Status(status, body, retry_after_ms) => {
                Err(remote_error(status, body, retry_after_ms))
            }
        }
    }
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig::default()
        .with_api_key("openai", "sk-test")
        .with_api_key("anthropic", "sk-ant-test")
        .with_api_key("gemini", "g-test")
}

pub fn dispatcher(upstream: Arc<ScriptedUpstream>) -> Dispatcher {
    dispatcher_with(upstream, test_config())
}

pub fn dispatcher_with(upstream: Arc<ScriptedUpstream>, config: GatewayConfig) -> Dispatcher {
    Dispatcher::builder()
        .registry(Registry::builtin())
        .config(config)
        .upstream(upstream)
        .build()
        .unwrap()
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        base_delay: Duration::from_millis(10),
        ..RetryConfig::default()
    }
}

pub fn content_of(events: &[UnifiedEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            UnifiedEvent::ContentDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Exactly one terminal event, and it is the last one.
pub fn assert_single_terminal(events: &[UnifiedEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "events: {:?}", events);
    assert!(events.last().map(UnifiedEvent::is_terminal).unwrap_or(false));
}

pub fn assert_consistent(events: &[UnifiedEvent], outcome: &StreamOutcome) {
    assert_single_terminal(events);
    if outcome.is_success() {
        assert_eq!(content_of(events), outcome.content);
    }
}

pub const OPENAI_HELLO: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" there\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"!\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3}}\n\n",
    "data: [DONE]\n\n",
);

pub const OPENAI_ROLE_ONLY: &str =
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n";

pub const OPENAI_FIRST_DELTA: &str =
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n";
