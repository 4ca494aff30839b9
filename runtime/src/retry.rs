//! Fixed-interval retry for transient connectivity failures.
//!
//! Reconnect loops wait the same interval after every failure: no backoff
//! growth and no jitter. By default there is no retry cap either, so the
//! loop never gives up. A cap exists so tests can bound the loop, and the
//! interval can be set to zero so tests never sleep in real time.
//!
//! # Example
//!
//! ```rust
//! use cartstream_runtime::retry::{RetryPolicy, retry_with_policy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .interval(Duration::from_millis(10))
//!     .max_retries(5)
//!     .build();
//!
//! let result = retry_with_policy(&policy, || async {
//!     // Your fallible operation here
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Default wait between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Retry policy: a fixed interval and an optional cap.
///
/// # Default Values
///
/// - `interval`: 3 seconds
/// - `max_retries`: `None` (retry forever)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before each retry
    pub interval: Duration,
    /// Maximum number of retries; `None` retries indefinitely
    pub max_retries: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_retries: None,
        }
    }
}

impl RetryPolicy {
    /// Retry forever at a fixed interval.
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_retries: None,
        }
    }

    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            interval: DEFAULT_INTERVAL,
            max_retries: None,
        }
    }

    /// Delay before retry number `attempt` (0-indexed), or `None` once the
    /// cap is reached.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self.max_retries {
            Some(max) if attempt >= max => None,
            _ => Some(self.interval),
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    interval: Duration,
    max_retries: Option<usize>,
}

impl RetryPolicyBuilder {
    /// Set the wait between attempts.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Cap the number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub const fn build(self) -> RetryPolicy {
        RetryPolicy {
            interval: self.interval,
            max_retries: self.max_retries,
        }
    }
}

/// Retry an async operation according to `policy`.
///
/// # Returns
///
/// Returns `Ok(T)` as soon as an attempt succeeds, or `Err(E)` with the
/// latest error once the policy's cap is reached. With no cap this only
/// returns on success.
///
/// # Errors
///
/// Returns the error of the final attempt when retries are exhausted.
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
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
            }
            Err(err) => {
                let Some(delay) = policy.delay_for_attempt(attempt) else {
                    tracing::error!(attempt, error = %err, "Operation failed after max retries");
                    return Err(err);
                };

                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
