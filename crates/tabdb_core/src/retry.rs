//! Retry with exponential backoff for backend operations.

use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tabdb_storage::{BackendAdapter, StorageResult};
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration with the given attempt count and default
    /// backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    /// Creates a configuration that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Delay to wait before the given attempt (0-indexed). The first attempt
    /// never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Runs backend operations with backoff, forcing a reconnect between
/// attempts.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    current_retry: AtomicU32,
    total_retries: AtomicU64,
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            current_retry: AtomicU32::new(0),
            total_retries: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Retry index of the operation currently running, zero after a success.
    pub fn current_retry(&self) -> u32 {
        self.current_retry.load(Ordering::Relaxed)
    }

    /// Retries performed over the policy's lifetime.
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    ///
    /// Between attempts the policy sleeps for the backoff delay and forces
    /// `backend` to reconnect. A failed reconnect is logged and the next
    /// attempt goes ahead anyway.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, F, Fut>(
        &self,
        op_name: &str,
        backend: &BackendAdapter,
        mut op: F,
    ) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(op = op_name, attempt, "operation succeeded after retry");
                    }
                    self.current_retry.store(0, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(op = op_name, attempts = attempt, error = %e, "operation failed, giving up");
                        self.current_retry.store(0, Ordering::Relaxed);
                        return Err(e);
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "operation failed, retrying"
                    );
                    self.current_retry.store(attempt, Ordering::Relaxed);
                    self.total_retries.fetch_add(1, Ordering::Relaxed);

                    tokio::time::sleep(delay).await;
                    if let Err(reconnect) = backend.reconnect().await {
                        debug!(op = op_name, error = %reconnect, "reconnect before retry failed");
                    }
                }
            }
        }
    }
}
