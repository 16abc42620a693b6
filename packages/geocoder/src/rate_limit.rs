//! Minimum-delay rate limiting with an injectable clock.

use std::time::Duration;

use async_trait::async_trait;

/// Time source used by [`RateLimiter`].
///
/// `now` is measured from an arbitrary, fixed origin.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Enforces a minimum delay between consecutive [`acquire`](Self::acquire)
/// calls.
#[derive(Debug)]
pub struct RateLimiter<C = TokioClock> {
    clock: C,
    min_interval: Duration,
    last: Option<Duration>,
}

impl<C: Clock> RateLimiter<C> {
    /// Creates a limiter allowing one acquisition per `min_interval`.
    pub const fn new(clock: C, min_interval: Duration) -> Self {
        Self {
            clock,
            min_interval,
            last: None,
        }
    }

    /// Minimum spacing between acquisitions.
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until `min_interval` has passed since the previous
    /// acquisition. The first call never waits.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last {
            let elapsed = self.clock.now().saturating_sub(last);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                log::trace!("Rate limiter waiting {}ms", wait.as_millis());
                self.clock.sleep(wait).await;
            }
        }
        self.last = Some(self.clock.now());
    }
}
