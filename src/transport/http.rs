use crate::config::GatewayConfig;
use crate::drivers::ProviderRequest;
use crate::error_code::ErrorKind;
use crate::transport::{ByteStream, TransportError, Upstream};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::Proxy;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// reqwest-backed [`Upstream`].
///
/// No overall request timeout is set: streams may legitimately run for minutes. The
/// dispatcher enforces the idle window between chunks instead.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Upper bound on reading a non-2xx body.
    error_body_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        // Minimal production-friendly defaults (env-overridable).
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(
                env::var("AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("AI_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )))
            // Conservative HTTP/2 keepalive defaults for long-lived streams.
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy_url {
            match Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy url"),
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self {
            client,
            error_body_timeout: config.idle_timeout,
        })
    }

    /// Wrap an existing client (custom TLS roots, test harnesses).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            error_body_timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl Upstream for HttpTransport {
    async fn open(&self, request: &ProviderRequest) -> Result<ByteStream> {
        let mut req = self.client.post(&request.url).json(&request.body);
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_ms(resp.headers());
            let body = match tokio::time::timeout(self.error_body_timeout, resp.text()).await {
                Ok(text) => text.unwrap_or_default(),
                Err(_) => {
                    warn!(provider = %request.provider, status = status.as_u16(), "timed out reading error body");
                    String::new()
                }
            };
            return Err(remote_error(status.as_u16(), &body, retry_after_ms));
        }
        debug!(provider = %request.provider, status = status.as_u16(), "upstream stream opened");

        let byte_stream = resp
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Body(e.to_string())));
        Ok(Box::pin(byte_stream))
    }
}

/// Build an `Error::Remote` from a non-success response.
///
/// The provider's own error code in the body (`error.code`, `error.type`,
/// `error.status`) refines the status mapping, except that 429 is always a rate limit.
pub fn remote_error(status: u16, body: &str, retry_after_ms: Option<u64>) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let err = parsed.as_ref().and_then(|v| v.get("error"));

    let provider_kind = err
        .into_iter()
        .flat_map(|e| ["code", "type", "status"].into_iter().filter_map(move |k| e.get(k)))
        .filter_map(Value::as_str)
        .find_map(ErrorKind::from_provider_code);
    let kind = if status == 429 {
        ErrorKind::RateLimited
    } else {
        provider_kind.unwrap_or_else(|| ErrorKind::from_http_status(status))
    };

    let message = err
        .and_then(|e| e.get("message").and_then(Value::as_str).or_else(|| e.as_str()))
        .map(String::from)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {}", status)
            } else {
                trimmed.chars().take(200).collect()
            }
        });

    Error::Remote {
        status,
        kind,
        message,
        retry_after_ms,
    }
}

/// `retry-after-ms` (OpenAI) or `retry-after` in seconds. HTTP-date forms are ignored.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    if let Some(ms) = headers
        .get("retry-after-ms")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
    {
        return Some(ms.max(0.0) as u64);
    }
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|secs| (secs.max(0.0) * 1000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_remote_error_uses_provider_code() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        match remote_error(529, body, None) {
            Error::Remote { kind, message, .. } => {
                assert_eq!(kind, ErrorKind::UpstreamServerError);
                assert_eq!(message, "Overloaded");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_remote_error_gemini_status_field() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(remote_error(400, body, None).kind(), ErrorKind::ConfigurationError);
        let body = r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(remote_error(429, body, Some(5000)).retry_after_ms(), Some(5000));
    }

    #[test]
    fn test_remote_error_code_before_type() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        assert_eq!(remote_error(401, body, None).kind(), ErrorKind::AuthenticationError);
    }

    #[test]
    fn test_remote_error_plain_text_body() {
        let err = remote_error(502, "Bad Gateway", None);
        assert_eq!(err.kind(), ErrorKind::UpstreamServerError);
        assert!(err.to_string().contains("Bad Gateway"));
        assert_eq!(remote_error(401, "", None).kind(), ErrorKind::AuthenticationError);
    }

    #[test]
    fn test_retry_after_headers() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after_ms(&h), None);
        h.insert("retry-after", HeaderValue::from_static("2"));
        assert_eq!(retry_after_ms(&h), Some(2000));
        h.insert("retry-after-ms", HeaderValue::from_static("1500"));
        assert_eq!(retry_after_ms(&h), Some(1500));
    }
}
