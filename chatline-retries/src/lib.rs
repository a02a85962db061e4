//! # chatline-retries
//!
//! Retry configuration and execution for chatline.
//!
//! Transient failures against a hosted API (rate limiting, 5xx responses,
//! dropped connections) are retried with a bounded number of attempts and
//! a wait between them. Everything here is independent of HTTP: an error
//! type opts in by implementing [`Retryable`].
//!
//! ## Core Concepts
//!
//! - **[`RetryConfig`]**: Configure retry behavior
//! - **[`WaitStrategy`]**: Define how long to wait between retries
//! - **[`RetryCondition`]**: Determine which errors are retryable
//! - **[`Retry`]**: Execute operations with retries, a custom [`Sleeper`]
//!   and an optional cancellation token
//!
//! ## Wait Strategies
//!
//! - [`WaitStrategy::Fixed`]: Constant delay between attempts
//! - [`WaitStrategy::ExponentialBackoff`]: Exponential delay with cap
//! - [`WaitStrategy::ExponentialJitter`]: Exponential with randomization
//! - [`WaitStrategy::Linear`]: Linearly increasing delay
//! - [`WaitStrategy::RetryAfter`]: Respect server's Retry-After header
//!
//! ## Features
//!
//! - `test-util`: exposes `RecordingSleeper`, which records requested
//!   waits instead of sleeping
//!
//! ## Example
//!
//! ```ignore
//! use chatline_retries::{Retry, RetryConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = RetryConfig::for_api();
//! let token = CancellationToken::new();
//!
//! let result = Retry::new(&config)
//!     .cancel_on(token.clone())
//!     .run(|| async { call_api().await })
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod executor;
pub mod retryable;
pub mod sleeper;

// Re-exports
pub use config::{RetryCondition, RetryConfig, WaitStrategy};
pub use executor::{with_retry, with_retry_state, AttemptInfo, Retry, RetryDecision, RetryState};
pub use retryable::{Cancelled, Retryable};
pub use sleeper::{Sleeper, TokioSleeper};
#[cfg(any(test, feature = "test-util"))]
pub use sleeper::RecordingSleeper;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{with_retry, Cancelled, Retry, RetryConfig, Retryable, Sleeper, WaitStrategy};
}
