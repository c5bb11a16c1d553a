use rand::Rng;
use std::time::Duration;

/// Delay schedule between upload attempts. A fixed delay is the special case
/// `base == max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self::exponential(delay, delay)
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (zero based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.delay_with_rng(retry, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let capped = base_ms
            .saturating_mul(1u64 << retry.min(16))
            .min(max_ms);
        if self.jitter {
            Duration::from_millis(rng.gen_range(0..=capped))
        } else {
            Duration::from_millis(capped)
        }
    }
}
