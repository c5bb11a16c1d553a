use std::time::Duration;

use crate::backoff::Backoff;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// How an upload reacts to transient failures. The default retries forever
/// with a fixed two second pause; set `limit` to bound it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// Maximum number of restarts after the first attempt. `None` is unbounded.
    pub limit: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::fixed(DEFAULT_RETRY_DELAY),
            limit: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(backoff: Backoff, limit: Option<u32>) -> Self {
        Self { backoff, limit }
    }

    /// Policy without pauses, mostly useful for tests and scripted agents.
    pub fn immediate(limit: Option<u32>) -> Self {
        Self::new(Backoff::fixed(Duration::ZERO), limit)
    }

    /// Whether restart number `retry` (one based) may happen.
    pub fn permits(&self, retry: u32) -> bool {
        self.limit.is_none_or(|limit| retry <= limit)
    }

    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff.delay(retry.saturating_sub(1))
    }
}
