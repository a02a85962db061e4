//! Retry configuration.

use crate::retryable::Retryable;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries. Total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Wait strategy.
    pub wait: WaitStrategy,
    /// Retry condition.
    pub retry_on: RetryCondition,
    /// Upper bound on the sum of all backoff waits for one call.
    pub max_total_wait: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait: WaitStrategy::ExponentialBackoff {
                initial: Duration::from_millis(1000),
                max: Duration::from_secs(60),
                multiplier: 2.0,
            },
            retry_on: RetryCondition::default(),
            max_total_wait: None,
        }
    }
}

impl RetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the wait strategy.
    pub fn wait(mut self, strategy: WaitStrategy) -> Self {
        self.wait = strategy;
        self
    }

    /// Use exponential backoff.
    pub fn exponential(mut self, initial: Duration, max: Duration) -> Self {
        self.wait = WaitStrategy::ExponentialBackoff {
            initial,
            max,
            multiplier: 2.0,
        };
        self
    }

    /// Use exponential backoff with jitter.
    pub fn exponential_jitter(mut self, initial: Duration, max: Duration, jitter: f64) -> Self {
        self.wait = WaitStrategy::ExponentialJitter {
            initial,
            max,
            multiplier: 2.0,
            jitter,
        };
        self
    }

    /// Use fixed delay.
    pub fn fixed(mut self, delay: Duration) -> Self {
        self.wait = WaitStrategy::Fixed(delay);
        self
    }

    /// Use linear backoff.
    pub fn linear(mut self, initial: Duration, increment: Duration, max: Duration) -> Self {
        self.wait = WaitStrategy::Linear {
            initial,
            increment,
            max,
        };
        self
    }

    /// Honor server `Retry-After` hints in full, falling back to the current
    /// strategy when no hint is given.
    pub fn respect_retry_after(mut self) -> Self {
        let fallback = std::mem::replace(&mut self.wait, WaitStrategy::None);
        self.wait = WaitStrategy::RetryAfter {
            fallback: Box::new(fallback),
            max_wait: None,
        };
        self
    }

    /// Like [`respect_retry_after`](Self::respect_retry_after), but clamp
    /// hints to `max_wait`. A clamped wait retries before the server asked.
    pub fn respect_retry_after_capped(mut self, max_wait: Duration) -> Self {
        let fallback = std::mem::replace(&mut self.wait, WaitStrategy::None);
        self.wait = WaitStrategy::RetryAfter {
            fallback: Box::new(fallback),
            max_wait: Some(max_wait),
        };
        self
    }

    /// Set retry condition.
    pub fn retry_on(mut self, condition: RetryCondition) -> Self {
        self.retry_on = condition;
        self
    }

    /// Bound the total time spent waiting between attempts.
    pub fn max_total_wait(mut self, budget: Duration) -> Self {
        self.max_total_wait = Some(budget);
        self
    }

    /// Total physical attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Config for remote API calls.
    ///
    /// Three retries. A server `Retry-After` hint is waited out in full;
    /// without one the wait is 1s doubling per retry, capped at 60s.
    /// Retries on 429, any 5xx and transport failures.
    pub fn for_api() -> Self {
        Self::new()
            .max_retries(3)
            .exponential(Duration::from_millis(1000), Duration::from_secs(60))
            .respect_retry_after()
            .retry_on(RetryCondition::new().on_rate_limit().on_server_errors())
    }

    /// Create config that never retries.
    pub fn no_retry() -> Self {
        Self::new().max_retries(0)
    }
}

/// Strategy for waiting between retries.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// No waiting.
    None,
    /// Fixed delay.
    Fixed(Duration),
    /// Exponential backoff.
    ExponentialBackoff {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier for each attempt.
        multiplier: f64,
    },
    /// Exponential backoff with jitter.
    ExponentialJitter {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier for each attempt.
        multiplier: f64,
        /// Jitter factor (0.0 to 1.0).
        jitter: f64,
    },
    /// Linear backoff.
    Linear {
        /// Initial delay.
        initial: Duration,
        /// Increment per attempt.
        increment: Duration,
        /// Maximum delay.
        max: Duration,
    },
    /// Respect Retry-After header.
    RetryAfter {
        /// Fallback if no header.
        fallback: Box<WaitStrategy>,
        /// Optional clamp on the hint. `None` waits as long as asked.
        max_wait: Option<Duration>,
    },
}

impl WaitStrategy {
    /// Calculate the wait before retry number `retry` (1-based).
    ///
    /// For exponential strategies the first retry waits `initial`, the
    /// second `initial * multiplier`, and so on.
    pub fn calculate(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        match self {
            WaitStrategy::None => Duration::ZERO,
            WaitStrategy::Fixed(d) => *d,
            WaitStrategy::ExponentialBackoff {
                initial,
                max,
                multiplier,
            } => {
                let delay = initial.as_secs_f64() * multiplier.powi(exponent);
                Duration::from_secs_f64(delay.min(max.as_secs_f64()))
            }
            WaitStrategy::ExponentialJitter {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                let base = initial.as_secs_f64() * multiplier.powi(exponent);
                let jitter_amount = base * jitter * random_jitter();
                let delay = (base + jitter_amount).clamp(0.0, max.as_secs_f64());
                Duration::from_secs_f64(delay)
            }
            WaitStrategy::Linear {
                initial,
                increment,
                max,
            } => {
                let delay = *initial + *increment * retry.saturating_sub(1);
                delay.min(*max)
            }
            WaitStrategy::RetryAfter { fallback, max_wait } => retry_after
                .map(|d| max_wait.map_or(d, |max| d.min(max)))
                .unwrap_or_else(|| fallback.calculate(retry, None)),
        }
    }
}

/// Condition for retrying.
#[derive(Debug, Clone, Default)]
pub struct RetryCondition {
    /// HTTP status codes to retry on.
    pub on_status_codes: Vec<u16>,
}

impl RetryCondition {
    /// Create a new empty condition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add status codes to retry on.
    pub fn on_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.on_status_codes.extend(codes);
        self
    }

    /// Retry on server errors (5xx).
    pub fn on_server_errors(mut self) -> Self {
        self.on_status_codes.extend(500..=599);
        self
    }

    /// Retry on rate limit (429).
    pub fn on_rate_limit(mut self) -> Self {
        self.on_status_codes.push(429);
        self
    }

    /// Check if an error should be retried.
    ///
    /// Cancellations never are. Listed status codes always are. Anything
    /// else defers to the error's own classification.
    pub fn should_retry<E: Retryable + ?Sized>(&self, error: &E) -> bool {
        if error.is_cancellation() {
            return false;
        }

        if let Some(status) = error.status() {
            if self.on_status_codes.contains(&status) {
                return true;
            }
        }

        error.is_retryable()
    }
}

/// Generate a random jitter factor between -1.0 and 1.0.
fn random_jitter() -> f64 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    rng.gen_range(-1.0..1.0)
}
