//! Rate limiting for transaction emission.
//!
//! Uses a token bucket with reservation semantics: every caller takes its
//! token immediately, letting the bucket go into debt, and then sleeps until
//! that token would have been refilled. Concurrent callers are therefore
//! paced one refill interval apart once the burst is spent, in the order they
//! reached the limiter.

use parking_lot::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Tokens added per second.
    pub rate_per_sec: u32,
    /// Maximum burst size (bucket capacity).
    pub burst: u32,
}

impl RateLimitConfig {
    /// Create a config; both values are clamped to at least 1.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            rate_per_sec: rate_per_sec.max(1),
            burst: burst.max(1),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(200, 200)
    }
}

/// Errors waiting for a token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The run was stopped while waiting.
    #[error("Rate limiter wait cancelled")]
    Cancelled,
}

/// Token bucket state.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens; negative while callers hold reservations.
    tokens: f64,
    /// Maximum tokens (bucket capacity).
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    /// Last time we updated the bucket.
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate: refill_rate as f64,
            last_update: now,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    /// Reserve one token. Returns how long until the reservation matures.
    fn reserve(&mut self, now: Instant) -> Duration {
        self.refill(now);
        self.tokens -= 1.0;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_rate)
        }
    }

    /// Give back a reservation that will not be used.
    fn refund(&mut self, now: Instant) {
        self.refill(now);
        self.tokens = (self.tokens + 1.0).min(self.capacity);
    }
}

/// Shared token-bucket limiter.
///
/// Safe for concurrent use; the bucket is guarded by a short critical section
/// and waiting happens outside the lock.
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            bucket: Mutex::new(TokenBucket::new(
                config.burst,
                config.rate_per_sec,
                Instant::now(),
            )),
        }
    }

    /// The limiter's configuration.
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Wait for one token.
    ///
    /// Returns how long the caller waited. If `cancel` fires first the
    /// reservation is refunded and [`AcquireError::Cancelled`] is returned.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Duration, AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        let start = Instant::now();
        let wait = self.bucket.lock().reserve(start);
        if wait.is_zero() {
            return Ok(Duration::ZERO);
        }

        tokio::select! {
            _ = tokio::time::sleep_until(start + wait) => Ok(start.elapsed()),
            _ = cancel.cancelled() => {
                self.bucket.lock().refund(Instant::now());
                Err(AcquireError::Cancelled)
            }
        }
    }
}
