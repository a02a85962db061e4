//! Retry executor for running operations with retries.

use crate::config::RetryConfig;
use crate::retryable::{Cancelled, Retryable};
use crate::sleeper::{Sleeper, TokioSleeper};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State of a retry loop.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Number of attempts made so far.
    pub attempt: u32,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total time spent waiting.
    pub total_wait_time: Duration,
    /// History of attempts.
    pub history: Vec<AttemptInfo>,
}

/// Information about a single attempt.
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    /// Attempt number.
    pub attempt: u32,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Time waited after this attempt.
    pub wait_time: Duration,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    Retry {
        /// Delay before the next attempt.
        wait: Duration,
    },
    /// Surface the error.
    GiveUp,
}

impl RetryState {
    /// Decide whether the failure of the current attempt should be retried.
    ///
    /// Gives up when the error is not retryable, when `max_retries` is
    /// reached, or when the wait would exceed the total wait budget.
    pub fn decide<E: Retryable + ?Sized>(&self, config: &RetryConfig, error: &E) -> RetryDecision {
        if self.attempt >= config.max_attempts() || !config.retry_on.should_retry(error) {
            return RetryDecision::GiveUp;
        }

        let wait = config.wait.calculate(self.attempt, error.retry_after());

        if let Some(budget) = config.max_total_wait {
            if self.total_wait_time + wait > budget {
                return RetryDecision::GiveUp;
            }
        }

        RetryDecision::Retry { wait }
    }

    fn record_success(&mut self) {
        self.history.push(AttemptInfo {
            attempt: self.attempt,
            success: true,
            error: None,
            wait_time: Duration::ZERO,
        });
    }

    fn record_failure(&mut self, error: String, wait: Duration) {
        self.total_wait_time += wait;
        self.history.push(AttemptInfo {
            attempt: self.attempt,
            success: false,
            error: Some(error.clone()),
            wait_time: wait,
        });
        self.last_error = Some(error);
    }
}

/// Execute an operation with retries.
///
/// # Example
///
/// ```ignore
/// use chatline_retries::{with_retry, RetryConfig};
///
/// let config = RetryConfig::for_api();
/// let result = with_retry(&config, || async {
///     // Your async operation here
///     Ok::<_, MyError>("success")
/// }).await?;
/// ```
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + From<Cancelled> + Display,
{
    Retry::new(config).run(operation).await
}

/// Execute with retries and get state information.
pub async fn with_retry_state<F, Fut, T, E>(
    config: &RetryConfig,
    operation: F,
) -> (Result<T, E>, RetryState)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + From<Cancelled> + Display,
{
    Retry::new(config).run_with_state(operation).await
}

/// Builder for retry operations.
pub struct Retry<'a> {
    config: &'a RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    cancel: Option<CancellationToken>,
}

impl<'a> Retry<'a> {
    /// Create a new retry builder using the tokio timer.
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokioSleeper),
            cancel: None,
        }
    }

    /// Wait between attempts through `sleeper`.
    #[must_use]
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Abort as soon as `token` is cancelled.
    ///
    /// Cancellation is observed before each attempt, while an attempt is in
    /// flight, and during backoff. The in-flight attempt is dropped.
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run the operation with retries.
    pub async fn run<F, Fut, T, E>(self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + From<Cancelled> + Display,
    {
        self.run_with_state(operation).await.0
    }

    /// Run and get state.
    pub async fn run_with_state<F, Fut, T, E>(self, mut operation: F) -> (Result<T, E>, RetryState)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + From<Cancelled> + Display,
    {
        let mut state = RetryState::default();
        let max_attempts = self.config.max_attempts();

        loop {
            if self.is_cancelled() {
                debug!(attempt = state.attempt, "Retry loop cancelled");
                return (Err(Cancelled.into()), state);
            }

            state.attempt += 1;

            debug!(
                attempt = state.attempt,
                max_attempts,
                max_retries = self.config.max_retries,
                "Executing retry attempt"
            );

            let outcome = match &self.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Cancelled.into()),
                    result = operation() => result,
                },
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => {
                    state.record_success();
                    return (Ok(value), state);
                }
                Err(error) => error,
            };

            let wait = match state.decide(self.config, &error) {
                RetryDecision::Retry { wait } => wait,
                RetryDecision::GiveUp => {
                    if !error.is_cancellation() {
                        warn!(
                            attempt = state.attempt,
                            error = %error,
                            "Retry exhausted or error not retryable"
                        );
                    }
                    state.record_failure(error.to_string(), Duration::ZERO);
                    return (Err(error), state);
                }
            };

            state.record_failure(error.to_string(), wait);

            debug!(
                attempt = state.attempt,
                wait_ms = wait.as_millis() as u64,
                error = %error,
                "Waiting before retry"
            );

            match &self.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(attempt = state.attempt, "Retry backoff cancelled");
                        return (Err(Cancelled.into()), state);
                    }
                    _ = self.sleeper.sleep(wait) => {}
                },
                None => self.sleeper.sleep(wait).await,
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
