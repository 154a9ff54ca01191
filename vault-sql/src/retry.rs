//! Exponential backoff for transient Vault failures.

use crate::config::VaultConfig;
use crate::error::VaultResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Retries operations that fail with [`crate::VaultError::is_retryable`] errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and first delay.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: MAX_DELAY,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Cap the delay between attempts.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Maximum number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before retry number `attempt` (zero based), with up to 25%
    /// jitter on top of the capped exponential delay.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        exp.mul_f64(1.0 + rand::random::<f64>() * 0.25)
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once the
    /// retry budget is spent.
    pub async fn run<F, Fut, T>(&self, what: &str, mut operation: F) -> VaultResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VaultResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation = what,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying after transient Vault error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

impl From<&VaultConfig> for RetryPolicy {
    fn from(config: &VaultConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }
}
