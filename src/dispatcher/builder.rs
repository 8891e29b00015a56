use std::sync::Arc;
use tracing::info;

use crate::config::GatewayConfig;
use crate::registry::Registry;
use crate::transport::{HttpTransport, Upstream};
use crate::Result;

use super::core::Dispatcher;

/// Builder for creating dispatchers with custom configuration.
///
/// Everything is optional: the defaults are [`GatewayConfig::from_env`], the registry
/// at `AI_GATEWAY_REGISTRY` (or the built-in table) and an [`HttpTransport`].
#[derive(Default)]
pub struct DispatcherBuilder {
    registry: Option<Arc<Registry>>,
    config: Option<GatewayConfig>,
    upstream: Option<Arc<dyn Upstream>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Share one registry between several dispatchers.
    pub fn shared_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the HTTP transport (fakes in tests, custom clients in production).
    pub fn upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        let config = self.config.unwrap_or_else(GatewayConfig::from_env);
        config.validate()?;

        let registry = match (self.registry, &config.registry_path) {
            (Some(r), _) => r,
            (None, Some(path)) => {
                info!(path = %path.display(), "loading provider registry");
                Arc::new(Registry::from_path(path)?)
            }
            (None, None) => Arc::new(Registry::builtin()),
        };

        let upstream: Arc<dyn Upstream> = match self.upstream {
            Some(u) => u,
            None => Arc::new(HttpTransport::new(&config)?),
        };

        Ok(Dispatcher {
            registry,
            config: Arc::new(config),
            upstream,
        })
    }
}
