use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff for refetching one page. Kept separate from
/// the crawl loop so the policy can change without touching pagination.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries per page, including the first.
    pub max_attempts: u32,
    pub base: Duration,
    /// Upper bound for the random jitter added to each backoff.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            base,
            max_jitter: Duration::from_millis(1000),
        }
    }

    /// Policy for tests: no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (0-based): base * 2^attempt
    /// plus jitter so concurrent crawls don't hammer a recovering source
    /// in lockstep.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return exp;
        }
        exp + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }
}
