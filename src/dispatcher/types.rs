//! Caller-facing handles and the per-attempt stream state.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error_code::ErrorKind;
use crate::tokens::{ModelPricing, UsageAccumulator};
use crate::types::{UnifiedEvent, UsageSummary};

/// Final record of one `stream()` invocation, for whoever persists the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub request_id: String,
    pub provider: String,
    pub model: String,
    /// Assembled content; on failure, whatever was produced before it.
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageSummary>,
    pub failure: Option<(ErrorKind, String)>,
    /// Upstream attempts made (0 when rejected before dispatch).
    pub attempts: u32,
    /// Malformed upstream records skipped in the final attempt.
    pub parse_errors: usize,
}

impl StreamOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub(crate) fn failed(
        request_id: &str,
        provider: &str,
        model: &str,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            content: String::new(),
            finish_reason: None,
            usage: None,
            failure: Some((kind, message.into())),
            attempts: 0,
            parse_errors: 0,
        }
    }
}

/// Control handle for a running stream.
///
/// Dropping the handle does not stop the stream; call [`StreamHandle::cancel`].
#[derive(Debug)]
pub struct StreamHandle {
    request_id: String,
    provider: String,
    model: String,
    cancel: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    pub(crate) fn new(
        request_id: String,
        provider: String,
        model: String,
        cancel: CancellationToken,
        task: JoinHandle<StreamOutcome>,
    ) -> Self {
        Self {
            request_id,
            provider,
            model,
            cancel,
            task,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Stop the stream. The upstream connection is dropped and a single
    /// `Failed { kind: Cancelled }` is the last event delivered. Idempotent, and a
    /// no-op once the stream has already terminated.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stream task to end.
    pub async fn finished(self) -> StreamOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => StreamOutcome::failed(
                &self.request_id,
                &self.provider,
                &self.model,
                ErrorKind::UpstreamServerError,
                format!("stream task aborted: {}", e),
            ),
        }
    }
}

/// Receiver side of a stream created by `Dispatcher::stream`.
///
/// Yields [`UnifiedEvent`]s in order; ends after the terminal `Done`/`Failed`.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<UnifiedEvent>,
    handle: StreamHandle,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<UnifiedEvent>, handle: StreamHandle) -> Self {
        Self { rx, handle }
    }

    pub async fn recv(&mut self) -> Option<UnifiedEvent> {
        self.rx.recv().await
    }

    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn into_parts(self) -> (mpsc::Receiver<UnifiedEvent>, StreamHandle) {
        (self.rx, self.handle)
    }

    /// Drain every event, then return them with the outcome.
    pub async fn collect_all(mut self) -> (Vec<UnifiedEvent>, StreamOutcome) {
        let mut events = Vec::new();
        while let Some(ev) = self.rx.recv().await {
            events.push(ev);
        }
        (events, self.handle.finished().await)
    }
}

impl Stream for EventStream {
    type Item = UnifiedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Mutable state of one attempt. A retry starts from a fresh value.
#[derive(Debug)]
pub(crate) struct StreamState {
    pub attempt: u32,
    pub content: String,
    pub usage: UsageAccumulator,
    /// Whether any content has reached the sink in this attempt.
    pub emitted_any: bool,
    pub parse_errors: usize,
}

impl StreamState {
    pub fn new(attempt: u32, pricing: Option<ModelPricing>) -> Self {
        Self {
            attempt,
            content: String::new(),
            usage: UsageAccumulator::new(pricing),
            emitted_any: false,
            parse_errors: 0,
        }
    }
}
