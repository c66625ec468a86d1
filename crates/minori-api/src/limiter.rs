//! Cooperative client-side rate limiting.
//!
//! One limiter per remote service, owned by that service's client and
//! shared with nothing else. The limiter tracks the last reserved call
//! instant and makes each caller wait out the remaining interval before
//! proceeding; under the sequential pipeline at most one call per service
//! is ever outstanding. The clock is injected so spacing can be asserted
//! deterministically in tests.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::StatusCode;

/// Time source for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Enforces a minimum spacing between calls to one service.
pub struct RateLimiter<C: Clock = SystemClock> {
    min_interval: Duration,
    clock: C,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter<SystemClock> {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(min_interval: Duration, clock: C) -> Self {
        Self {
            min_interval,
            clock,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the inter-call interval has elapsed, then claim the slot.
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Compute the wait for the next call and reserve its slot.
    fn reserve(&self) -> Duration {
        let now = self.clock.now();
        let mut last = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let wait = match *last {
            Some(prev) => (prev + self.min_interval).saturating_duration_since(now),
            None => Duration::ZERO,
        };
        *last = Some(now + wait);
        wait
    }
}

/// One-shot retry budget for explicit rate-limit responses.
///
/// Created per request; the first `429` spends the budget, every later
/// answer is final. Any other status never triggers a retry.
#[derive(Debug, Default)]
pub struct RetryOnce {
    spent: bool,
}

impl RetryOnce {
    /// Whether this response should be retried.
    pub fn should_retry(&mut self, status: StatusCode) -> bool {
        if status == StatusCode::TOO_MANY_REQUESTS && !self.spent {
            self.spent = true;
            return true;
        }
        false
    }
}
