//! 网关错误分类：定义失败种类及其重试语义。
//!
//! Gateway failure taxonomy.
//!
//! Every failure that reaches a caller is tagged with one [`ErrorKind`]. The kind,
//! not the concrete error type, decides whether the dispatcher retries.
//!
//! | Kind | Retried by dispatcher | `Failed.retryable` |
//! |------|-----------------------|--------------------|
//! | `ConfigurationError` | never | false |
//! | `AuthenticationError` | never | false |
//! | `TransientNetworkError` | up to the attempt cap | false once exhausted |
//! | `UpstreamServerError` | same as transient | false once exhausted |
//! | `RateLimited` | never (caller backs off) | true |
//! | `ParseError` | logged only | n/a |
//! | `Cancelled` | never | false |
//!
//! ## Example
//!
//! ```rust
//! use ai_stream_gateway::error_code::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(503);
//! assert_eq!(kind, ErrorKind::UpstreamServerError);
//! assert!(kind.is_transient());
//! assert_eq!(ErrorKind::from_http_status(429).name(), "rate_limited");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category carried by `UnifiedEvent::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid settings, unknown provider/model, or a request the provider rejects as malformed.
    ConfigurationError,
    /// Upstream rejected the credentials.
    AuthenticationError,
    /// Connection refused/reset, timeouts, idle stalls.
    TransientNetworkError,
    /// Upstream signalled throttling.
    RateLimited,
    /// 5xx-class provider failure.
    UpstreamServerError,
    /// A malformed individual record.
    ParseError,
    /// The caller cancelled the stream.
    Cancelled,
}

impl ErrorKind {
    /// Returns the snake_case name (e.g. `"rate_limited"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::AuthenticationError => "authentication_error",
            Self::TransientNetworkError => "transient_network_error",
            Self::RateLimited => "rate_limited",
            Self::UpstreamServerError => "upstream_server_error",
            Self::ParseError => "parse_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the dispatcher may retry the attempt on its own.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetworkError | Self::UpstreamServerError)
    }

    /// Value of `retryable` reported to the caller on the terminal `Failed` event.
    ///
    /// Only rate limits are caller-retryable: transient kinds have already been
    /// retried internally by the time they surface.
    #[inline]
    pub fn caller_retryable(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Maps an HTTP status code to a failure kind.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthenticationError,
            408 => Self::TransientNetworkError,
            429 => Self::RateLimited,
            // 529: Anthropic overloaded, non-standard but common
            500..=599 => Self::UpstreamServerError,
            _ => Self::ConfigurationError,
        }
    }

    /// Maps a provider error code/type string (from a response body or an in-stream
    /// error event) to a failure kind.
    pub fn from_provider_code(code: &str) -> Option<Self> {
        let kind = match code {
            "rate_limit_error" | "rate_limit_exceeded" | "rate_limited" | "RESOURCE_EXHAUSTED" => {
                Self::RateLimited
            }
            "authentication_error" | "invalid_api_key" | "permission_error" | "UNAUTHENTICATED"
            | "PERMISSION_DENIED" => Self::AuthenticationError,
            "overloaded_error" | "api_error" | "server_error" | "INTERNAL" | "UNAVAILABLE" => {
                Self::UpstreamServerError
            }
            "timeout" | "DEADLINE_EXCEEDED" => Self::TransientNetworkError,
            "invalid_request_error" | "not_found_error" | "model_not_found"
            | "context_length_exceeded" | "INVALID_ARGUMENT" | "NOT_FOUND" => {
                Self::ConfigurationError
            }
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
