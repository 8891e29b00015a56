//! 网关运行配置：超时、重试、通道容量，支持环境变量覆盖。
//!
//! Runtime knobs for the gateway. Defaults are production-friendly; every field can
//! be overridden from the environment with [`GatewayConfig::from_env`].
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `AI_GATEWAY_IDLE_TIMEOUT_SECS` | `idle_timeout` | 60 |
//! | `AI_GATEWAY_CONNECT_TIMEOUT_SECS` | `connect_timeout` | 10 |
//! | `AI_GATEWAY_MAX_ATTEMPTS` | `retry.max_attempts` | 3 |
//! | `AI_GATEWAY_RETRY_BASE_MS` | `retry.base_delay` | 1000 |
//! | `AI_GATEWAY_CHANNEL_CAPACITY` | `channel_capacity` | 64 |
//! | `AI_PROXY_URL` | `proxy_url` | unset |
//! | `AI_GATEWAY_REGISTRY` | `registry_path` | unset (built-in table) |

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::registry::ProviderDescriptor;
use crate::{Error, ErrorContext, Result};

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based
    /// (1s, 2s, 4s, ... with the defaults).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let mult = self.factor.saturating_pow(exp);
        self.base_delay
            .checked_mul(mult)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum silence between upstream chunks before the attempt is abandoned.
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
    /// Capacity of the per-stream event channel (backpressure bound).
    pub channel_capacity: usize,
    pub proxy_url: Option<String>,
    pub registry_path: Option<PathBuf>,
    /// Per-provider base URL replacements (e.g. a self-hosted gateway or a test server).
    pub base_url_overrides: HashMap<String, String>,
    /// Explicit API keys, consulted before the descriptor's environment variable.
    pub api_keys: HashMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            channel_capacity: 64,
            proxy_url: None,
            registry_path: None,
            base_url_overrides: HashMap::new(),
            api_keys: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Defaults overlaid with `AI_GATEWAY_*` environment variables.
    ///
    /// Unparseable values are logged and ignored rather than failing start-up.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(secs) = env_parse::<u64>("AI_GATEWAY_IDLE_TIMEOUT_SECS") {
            cfg.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("AI_GATEWAY_CONNECT_TIMEOUT_SECS") {
            cfg.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("AI_GATEWAY_MAX_ATTEMPTS") {
            cfg.retry.max_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>("AI_GATEWAY_RETRY_BASE_MS") {
            cfg.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("AI_GATEWAY_CHANNEL_CAPACITY") {
            cfg.channel_capacity = n;
        }
        cfg.proxy_url = env::var("AI_PROXY_URL").ok().filter(|s| !s.is_empty());
        cfg.registry_path = env::var_os("AI_GATEWAY_REGISTRY").map(PathBuf::from);
        cfg
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_base_url(mut self, provider_id: &str, base_url: impl Into<String>) -> Self {
        self.base_url_overrides
            .insert(provider_id.to_string(), base_url.into());
        self
    }

    pub fn with_api_key(mut self, provider_id: &str, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider_id.to_string(), key.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(config_error("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.factor == 0 {
            return Err(config_error("retry.factor", "must be at least 1"));
        }
        if self.channel_capacity == 0 {
            return Err(config_error("channel_capacity", "must be at least 1"));
        }
        if self.idle_timeout.is_zero() {
            return Err(config_error("idle_timeout", "must be non-zero"));
        }
        Ok(())
    }

    pub fn base_url_for<'a>(&'a self, descriptor: &'a ProviderDescriptor) -> &'a str {
        self.base_url_overrides
            .get(&descriptor.id)
            .map(String::as_str)
            .unwrap_or(&descriptor.base_url)
    }

    /// Resolve the API key for a provider.
    ///
    /// Returns `Ok(None)` for keyless providers and a configuration error when the
    /// descriptor names a key variable that is unset.
    pub fn api_key_for(&self, descriptor: &ProviderDescriptor) -> Result<Option<String>> {
        if let Some(key) = self.api_keys.get(&descriptor.id) {
            return Ok(Some(key.clone()));
        }
        let Some(var) = descriptor.api_key_env.as_deref() else {
            return Ok(None);
        };
        match env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ => Err(Error::configuration_with_context(
                format!("missing API key for provider {}", descriptor.id),
                ErrorContext::new()
                    .with_field_path(format!("providers.{}.api_key_env", descriptor.id))
                    .with_details(format!("environment variable {} is not set", var))
                    .with_source("gateway_config"),
            )),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

fn config_error(field: &str, msg: &str) -> Error {
    Error::configuration_with_context(
        format!("{} {}", field, msg),
        ErrorContext::new()
            .with_field_path(field)
            .with_source("gateway_config"),
    )
}
