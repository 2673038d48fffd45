//! Retry logic with exponential backoff
//!
//! The resolver and fetcher never retry on their own. The orchestrator may
//! wrap a single item's fetch in [`with_retry`] when the configured
//! [`RetryConfig`] allows it, before giving up and using the manual-save
//! fallback.
//!
//! # Example
//!
//! ```no_run
//! use insta_media_dl::retry::{IsRetryable, with_retry};
//! use insta_media_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig { max_attempts: 3, ..Default::default() };
//! with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection errors, overloaded proxy) return `true`.
/// Permanent failures (not found, forbidden, expired URL) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Transport { connect, .. } => *connect,
            // 429 and 5xx come from an overloaded or throttled proxy
            FetchError::HttpStatus { status } => *status == 429 || *status >= 500,
            // Truncated body; the next attempt may complete
            FetchError::Body(_) => true,
            // The proxy answered with an error document; asking again gets the same one
            FetchError::UnexpectedContent { .. } => false,
        }
    }
}

/// Multiply `delay` by `factor`, clamped to `cap`
///
/// Negative, NaN and overflowing products clamp instead of panicking, so a
/// hand-built [`RetryConfig`] that skipped validation still sleeps sanely.
fn scale(delay: Duration, factor: f64, cap: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).map_or(cap, |d| d.min(cap))
}

/// Remaining sleeps of one retry run
struct Backoff<'a> {
    config: &'a RetryConfig,
    retries_left: u32,
    next: Duration,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            retries_left: config.max_attempts,
            next: config.initial_delay.min(config.max_delay),
        }
    }

    /// The pause before the next attempt, or `None` once retries are spent
    fn next_delay(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;

        let base = self.next;
        self.next = scale(base, self.config.backoff_multiplier, self.config.max_delay);
        Some(if self.config.jitter {
            add_jitter(base)
        } else {
            base
        })
    }

    fn attempts_made(&self) -> u32 {
        self.config.max_attempts - self.retries_left + 1
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Makes `1 + config.max_attempts` attempts at most. Non-retryable errors are
/// returned immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);

    loop {
        let err = match operation().await {
            Ok(value) => {
                if backoff.attempts_made() > 1 {
                    tracing::info!(
                        attempts = backoff.attempts_made(),
                        "fetch succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        let Some(pause) = backoff.next_delay() else {
            if config.max_attempts > 0 {
                tracing::warn!(
                    error = %err,
                    attempts = backoff.attempts_made(),
                    "giving up after retries"
                );
            }
            return Err(err);
        };

        tracing::warn!(
            error = %err,
            attempt = backoff.attempts_made() - 1,
            max_attempts = config.max_attempts,
            pause_ms = pause.as_millis() as u64,
            "transient failure, retrying"
        );
        tokio::time::sleep(pause).await;
    }
}

/// Stretch `delay` by a random 0% to 100%
fn add_jitter(delay: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(0.0..=1.0);
    scale(delay, factor, delay.saturating_mul(2))
}
