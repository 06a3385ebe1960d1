//! Retry with exponential backoff for transient failures.
//!
//! Used for order-event publishing, where the order is already committed and
//! a broker hiccup should not immediately surface as a notification failure.
//!
//! # Example
//!
//! ```rust
//! use storefront_service::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .initial_delay(Duration::from_millis(50))
//!     .build();
//!
//! let value = retry_with_backoff(&policy, || async { Ok::<_, String>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 2 (three attempts in total)
/// - `initial_delay`: 100ms
/// - `max_delay`: 5 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: 0.1 (up to 10% added to each delay)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Fraction of the delay added at random
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: None,
        }
    }

    /// Policy allowing `attempts` calls in total.
    #[must_use]
    pub fn attempts(attempts: usize, initial_delay: Duration) -> Self {
        Self::builder()
            .max_retries(attempts.saturating_sub(1))
            .initial_delay(initial_delay)
            .build()
    }

    /// Delay before retry number `attempt` (zero-based), without jitter.
    ///
    /// `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let max_ms = self.max_delay.as_millis() as f64;

        if delay_ms >= max_ms {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn jittered(&self, delay: Duration) -> Duration {
        let spread = (delay.as_millis() as f64 * self.jitter) as u64;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the random jitter fraction (0.0 disables jitter).
    #[must_use]
    pub const fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(2),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(100)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(5)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(0.1).clamp(0.0, 1.0),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Returns the first success, or the error of the final attempt once
/// `max_retries` retries have failed.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            },
            Err(err) => {
                if attempt >= policy.max_retries {
                    tracing::error!(attempt, error = %err, "Operation failed after max retries");
                    return Err(err);
                }

                let delay = policy.jittered(policy.delay_for_attempt(attempt));
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                attempt += 1;
            },
        }
    }
}
