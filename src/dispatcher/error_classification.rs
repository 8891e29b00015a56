//! Error classification logic

use crate::error_code::ErrorKind;
use crate::Error;

/// Classify an error reported inside an otherwise healthy stream.
///
/// Providers put their own vocabulary in these events (`overloaded_error`,
/// `rate_limit_exceeded`, ...). Unknown codes are treated as a server-side failure.
pub(crate) fn classify_stream_error(code: Option<&str>, message: &str) -> Error {
    let kind = code
        .and_then(ErrorKind::from_provider_code)
        .or_else(|| kind_from_message(message))
        .unwrap_or(ErrorKind::UpstreamServerError);
    Error::Upstream {
        kind,
        message: message.to_string(),
    }
}

/// Heuristic for providers that only send a message (Ollama).
fn kind_from_message(message: &str) -> Option<ErrorKind> {
    let m = message.to_ascii_lowercase();
    if m.contains("rate limit") || m.contains("too many requests") {
        Some(ErrorKind::RateLimited)
    } else if m.contains("not found") || m.contains("invalid") {
        Some(ErrorKind::ConfigurationError)
    } else {
        None
    }
}

/// The `retryable` flag reported on the terminal `Failed` event.
///
/// Once content has been delivered the stream cannot be replayed, so the caller is
/// told not to retry whatever the kind.
pub(crate) fn caller_retryable(err: &Error, emitted_any: bool) -> bool {
    !emitted_any && err.kind().caller_retryable()
}
