//! # Retry
//!
//! Retries a fallible async operation with a fixed or exponentially growing
//! interval. Used for sequencer RPC calls, gossip publishes and bootstrap
//! connection attempts.
//!
//! Defaults: 3 retries, 2 s interval, no growth, 60 s cap.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Number of retries after the first attempt; `None` retries forever.
    pub retries: Option<u32>,
    /// Delay before the first retry.
    pub interval: Duration,
    /// Growth factor applied to the interval after every retry.
    pub multiplier: f64,
    /// Upper bound for the interval.
    pub max_interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: Some(3),
            interval: Duration::from_secs(2),
            multiplier: 1.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl RetryOptions {
    /// A single attempt, no retries.
    pub fn no_retries() -> Self {
        Self {
            retries: Some(0),
            ..Self::default()
        }
    }

    pub fn number_of_retries(mut self, n: u32) -> Self {
        self.retries = Some(n);
        self
    }

    pub fn infinite(mut self) -> Self {
        self.retries = None;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn max_interval(mut self, max: Duration) -> Self {
        self.max_interval = max;
        self
    }

    /// Grow the interval by `multiplier` per retry. Values ≤ 1.0 are clamped
    /// to the default growth of 1.5.
    pub fn exponential_backoff(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier > 1.0 { multiplier } else { 1.5 };
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        if current.as_secs_f64() * self.multiplier >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            current.mul_f64(self.multiplier)
        }
    }
}

/// Run `op` until it succeeds or the retry budget is exhausted. The last
/// error is returned on exhaustion.
pub async fn retry<T, E, F, Fut>(options: &RetryOptions, label: &str, op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_if(options, label, op, |_| true).await
}

/// Like [`retry`], but stops immediately on errors for which `retryable`
/// returns false.
pub async fn retry_if<T, E, F, Fut, P>(
    options: &RetryOptions,
    label: &str,
    mut op: F,
    retryable: P,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut interval = options.interval;
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(label, attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                let exhausted = options.retries.is_some_and(|n| attempt >= n);
                if exhausted || !retryable(&e) {
                    return Err(e);
                }
                warn!(
                    label,
                    attempt,
                    retry_in_ms = interval.as_millis() as u64,
                    error = %e,
                    "call failed, retrying"
                );
                tokio::time::sleep(interval).await;
                interval = options.next_interval(interval);
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
