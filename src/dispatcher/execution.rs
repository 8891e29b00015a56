//! 流式执行逻辑：单次尝试的读取循环与外层重试循环。
//!
//! Stream execution: the per-attempt read loop and the retry loop around it.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GatewayConfig;
use crate::pipeline::NativeEvent;
use crate::transport::{TransportError, Upstream};
use crate::types::UnifiedEvent;
use crate::{Error, Result};

use super::core::PreparedRequest;
use super::error_classification::{caller_retryable, classify_stream_error};
use super::policy::{Decision, RetryPolicy};
use super::types::{StreamOutcome, StreamState};

/// Everything one spawned stream owns.
pub(crate) struct StreamTask {
    pub request_id: String,
    pub prepared: PreparedRequest,
    pub upstream: Arc<dyn Upstream>,
    pub config: Arc<GatewayConfig>,
    pub sink: mpsc::Sender<UnifiedEvent>,
    pub cancel: CancellationToken,
}

impl StreamTask {
    pub async fn run(self) -> StreamOutcome {
        let span = info_span!(
            "stream",
            request_id = %self.request_id,
            provider = %self.prepared.provider,
            model = %self.prepared.model,
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> StreamOutcome {
        let policy = RetryPolicy::new(self.config.retry.clone());
        let start = Instant::now();
        info!(max_attempts = policy.max_attempts(), "stream started");

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut state = StreamState::new(attempt, self.prepared.pricing.clone());

            let err = match self.attempt(&mut state).await {
                Ok(finish_reason) => match self.complete(&mut state, finish_reason).await {
                    Ok(outcome) => {
                        info!(
                            attempts = attempt,
                            prompt_tokens = outcome.usage.as_ref().map(|u| u.prompt_tokens),
                            completion_tokens = outcome.usage.as_ref().map(|u| u.completion_tokens),
                            parse_errors = outcome.parse_errors,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "stream completed"
                        );
                        return outcome;
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };

            match policy.decide(&err, attempt, state.emitted_any) {
                Decision::Retry { delay } => {
                    warn!(
                        attempt,
                        error = %err,
                        kind = err.kind().name(),
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return self.fail(Error::Cancelled, state, start).await;
                        }
                        _ = sleep(delay) => {}
                    }
                }
                Decision::Fail => return self.fail(err, state, start).await,
            }
        }
    }

    /// One upstream attempt. Returns the finish reason once the parser saw the end of
    /// the message.
    async fn attempt(&self, state: &mut StreamState) -> Result<String> {
        let mut parser = self.prepared.driver.new_parser();
        debug!(attempt = state.attempt, url = %self.prepared.request.url, "opening upstream");

        let idle = self.config.idle_timeout;
        // the idle window also covers waiting for response headers (or an error body)
        let mut body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            opened = timeout(idle, self.upstream.open(&self.prepared.request)) => {
                opened.map_err(|_| Error::IdleTimeout { secs: idle.as_secs() })??
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                next = timeout(idle, body.next()) => next,
            };

            let (events, eof) = match next {
                Err(_) => {
                    return Err(Error::IdleTimeout {
                        secs: idle.as_secs(),
                    })
                }
                Ok(None) => (parser.finish(), true),
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(bytes))) => (parser.feed(&bytes), false),
            };
            state.parse_errors = parser.parse_errors();

            for event in events {
                match event {
                    NativeEvent::ContentDelta(text) => {
                        state.content.push_str(&text);
                        if self.prepared.incremental {
                            self.emit(UnifiedEvent::ContentDelta { text }).await?;
                            state.emitted_any = true;
                        }
                    }
                    NativeEvent::Usage(update) => {
                        state.usage.update(update);
                        self.emit(UnifiedEvent::Usage {
                            prompt_tokens: state.usage.prompt_tokens(),
                            completion_tokens: state.usage.completion_tokens(),
                        })
                        .await?;
                    }
                    NativeEvent::Done { finish_reason } => {
                        return Ok(finish_reason.unwrap_or_else(|| "stop".into()));
                    }
                    NativeEvent::Error { code, message } => {
                        return Err(classify_stream_error(code.as_deref(), &message));
                    }
                }
            }

            if eof {
                return Err(Error::Transport(TransportError::Body(
                    "stream ended before completion".into(),
                )));
            }
        }
    }

    /// Flush buffered content, finalize usage and send `Done`.
    async fn complete(&self, state: &mut StreamState, finish_reason: String) -> Result<StreamOutcome> {
        if !self.prepared.incremental && !state.content.is_empty() {
            self.emit(UnifiedEvent::ContentDelta {
                text: state.content.clone(),
            })
            .await?;
            state.emitted_any = true;
        }

        if !state.usage.has_reported() {
            debug!("provider reported no usage, estimating");
        }
        state
            .usage
            .estimate_missing(self.prepared.prompt_estimate, &state.content);
        let usage = state.usage.finalize();

        // terminal: delivered even if cancel races in now
        let _ = self
            .sink
            .send(UnifiedEvent::Done {
                finish_reason: finish_reason.clone(),
                usage: usage.clone(),
            })
            .await;

        Ok(StreamOutcome {
            request_id: self.request_id.clone(),
            provider: self.prepared.provider.clone(),
            model: self.prepared.model.clone(),
            content: std::mem::take(&mut state.content),
            finish_reason: Some(finish_reason),
            usage: Some(usage),
            failure: None,
            attempts: state.attempt,
            parse_errors: state.parse_errors,
        })
    }

    async fn fail(&self, err: Error, state: StreamState, start: Instant) -> StreamOutcome {
        let kind = err.kind();
        let retryable = caller_retryable(&err, state.emitted_any);
        let event = match UnifiedEvent::failed(&err) {
            UnifiedEvent::Failed {
                kind,
                message,
                retry_after_ms,
                ..
            } => UnifiedEvent::Failed {
                kind,
                message,
                retryable,
                retry_after_ms,
            },
            other => other,
        };
        let _ = self.sink.send(event).await;

        info!(
            attempts = state.attempt,
            kind = kind.name(),
            error = %err,
            emitted_any = state.emitted_any,
            partial_chars = state.content.chars().count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "stream failed"
        );

        StreamOutcome {
            request_id: self.request_id.clone(),
            provider: self.prepared.provider.clone(),
            model: self.prepared.model.clone(),
            content: if state.emitted_any {
                state.content
            } else {
                String::new()
            },
            finish_reason: None,
            usage: None,
            failure: Some((kind, err.to_string())),
            attempts: state.attempt,
            parse_errors: state.parse_errors,
        }
    }

    /// Push a non-terminal event, giving up if the caller cancels or goes away.
    async fn emit(&self, event: UnifiedEvent) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            sent = self.sink.send(event) => sent.map_err(|_| {
                debug!("event receiver dropped");
                self.cancel.cancel();
                Error::Cancelled
            }),
        }
    }
}
