//! Upstream transport: opening a provider's streaming response.
//!
//! The dispatcher only talks to [`Upstream`]; [`HttpTransport`] is the reqwest-backed
//! implementation used in production, tests substitute their own.

pub mod http;

pub use http::HttpTransport;

use crate::drivers::ProviderRequest;
use crate::error_code::ErrorKind;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Raw upstream body, chunk by chunk. A mid-body failure arrives as an `Err` item.
pub type ByteStream = BoxStream<'static, Bytes>;

/// Opens one upstream connection per call.
///
/// A non-success HTTP status must be reported as `Error::Remote` so the dispatcher
/// can classify it; connection-level failures as `Error::Transport`.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn open(&self, request: &ProviderRequest) -> Result<ByteStream>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Response body interrupted: {0}")]
    Body(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Http(e) => match e.status() {
                Some(status) => ErrorKind::from_http_status(status.as_u16()),
                None if e.is_builder() => ErrorKind::ConfigurationError,
                None => ErrorKind::TransientNetworkError,
            },
            TransportError::Connection(_) | TransportError::Body(_) => {
                ErrorKind::TransientNetworkError
            }
            TransportError::Other(_) => ErrorKind::UpstreamServerError,
        }
    }
}
