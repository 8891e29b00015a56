use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::drivers::{create_driver, truncate_history, Endpoint, ProviderDriver, ProviderRequest};
use crate::registry::Registry;
use crate::tokens::{estimate_conversation, ModelPricing};
use crate::transport::Upstream;
use crate::types::{Message, Settings, UnifiedEvent};
use crate::{Error, ErrorContext, Result};

use super::builder::DispatcherBuilder;
use super::execution::StreamTask;
use super::types::{EventStream, StreamHandle, StreamOutcome};

/// Validated, fully-built request for one stream.
#[derive(Debug)]
pub struct PreparedRequest {
    pub request: ProviderRequest,
    pub driver: Box<dyn ProviderDriver>,
    pub pricing: Option<ModelPricing>,
    /// Estimated prompt size, used when the provider reports no usage.
    pub prompt_estimate: u64,
    pub provider: String,
    pub model: String,
    /// Deliver content incrementally (`Settings::stream`).
    pub incremental: bool,
}

/// Entry point: turns `(conversation, settings)` into a stream of [`UnifiedEvent`]s.
///
/// Cheap to clone; clones share the registry, config and upstream.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) registry: Arc<Registry>,
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) upstream: Arc<dyn Upstream>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("providers", &self.registry.ids())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Validate and build the upstream request without sending anything.
    ///
    /// Every check the dispatcher makes before contacting a provider happens here:
    /// settings ranges, non-empty conversation, known provider and model, API key.
    pub fn prepare(&self, conversation: &[Message], settings: &Settings) -> Result<PreparedRequest> {
        settings.validate()?;
        if conversation.is_empty() {
            return Err(Error::configuration_with_context(
                "conversation must contain at least one message",
                ErrorContext::new()
                    .with_field_path("conversation")
                    .with_source("dispatcher"),
            ));
        }

        let descriptor = self.registry.lookup(&settings.provider)?;
        let model = descriptor.model(&settings.model).ok_or_else(|| {
            Error::configuration_with_context(
                format!(
                    "model {} is not offered by provider {}",
                    settings.model, descriptor.id
                ),
                ErrorContext::new()
                    .with_field_path("settings.model")
                    .with_details(format!(
                        "known models: {}",
                        descriptor.model_ids().collect::<Vec<_>>().join(", ")
                    ))
                    .with_source("dispatcher"),
            )
        })?;
        let api_key = self.config.api_key_for(descriptor)?;

        let history = match model.context_window {
            Some(window) => truncate_history(conversation, window, settings.max_tokens),
            None => conversation.to_vec(),
        };

        let driver = create_driver(descriptor.api_style);
        let request = driver.build_request(
            &history,
            settings,
            Endpoint {
                provider_id: &descriptor.id,
                base_url: self.config.base_url_for(descriptor),
                api_key: api_key.as_deref(),
            },
        )?;
        debug!(provider = %descriptor.id, url = %request.url, messages = history.len(), "request prepared");

        Ok(PreparedRequest {
            request,
            driver,
            pricing: Some(model.pricing()),
            prompt_estimate: estimate_conversation(&history),
            provider: descriptor.id.clone(),
            model: model.id.clone(),
            incremental: settings.stream,
        })
    }

    /// Start a stream and receive its events from the returned [`EventStream`].
    ///
    /// The channel is bounded by `GatewayConfig::channel_capacity`: a slow reader
    /// slows the upstream read loop instead of growing a buffer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream(&self, conversation: &[Message], settings: &Settings) -> EventStream {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let handle = self.stream_to(conversation, settings, tx);
        EventStream::new(rx, handle)
    }

    /// Start a stream that writes into a caller-supplied sink.
    ///
    /// Exactly one terminal event (`Done` or `Failed`) is sent, and nothing after it.
    /// Invalid settings produce a single `Failed { kind: ConfigurationError }` without
    /// any upstream call.
    pub fn stream_to(
        &self,
        conversation: &[Message],
        settings: &Settings,
        sink: mpsc::Sender<UnifiedEvent>,
    ) -> StreamHandle {
        let request_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let provider = settings.provider.clone();
        let model = settings.model.clone();

        let task = match self.prepare(conversation, settings) {
            Ok(prepared) => {
                let task = StreamTask {
                    request_id: request_id.clone(),
                    prepared,
                    upstream: Arc::clone(&self.upstream),
                    config: Arc::clone(&self.config),
                    sink,
                    cancel: cancel.clone(),
                };
                tokio::spawn(task.run())
            }
            Err(err) => {
                let outcome = StreamOutcome::failed(
                    &request_id,
                    &provider,
                    &model,
                    err.kind(),
                    err.to_string(),
                );
                tracing::info!(
                    request_id = %request_id,
                    provider = %provider,
                    model = %model,
                    error = %err,
                    "stream rejected before dispatch"
                );
                tokio::spawn(async move {
                    let _ = sink.send(UnifiedEvent::failed(&err)).await;
                    outcome
                })
            }
        };

        StreamHandle::new(request_id, provider, model, cancel, task)
    }
}
