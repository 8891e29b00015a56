use std::time::Duration;

use crate::config::RetryConfig;
use crate::Error;

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Internal retry policy.
///
/// - Only transient kinds (network, 5xx, idle timeout) are retried.
/// - Nothing is retried once content reached the caller in the current attempt;
///   replaying would duplicate it.
/// - Rate limits are handed back to the caller with the provider's hint.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Decide what to do after `attempt` (1-based) failed with `err`.
    pub fn decide(&self, err: &Error, attempt: u32, emitted_any: bool) -> Decision {
        if emitted_any || !err.kind().is_transient() || attempt >= self.config.max_attempts {
            return Decision::Fail;
        }
        Decision::Retry {
            delay: self.config.delay_for(attempt),
        }
    }
}
