//! Bounded retry of operations that lost a write-write conflict.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tally_common::Result;
use tokio::time::sleep;
use tracing::warn;

/// Jittered exponential backoff, applied only to retryable ledger errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        base_delay: Duration,
        max_delay: Duration,
        jitter_pct: f64,
    ) -> Self {
        let base_delay = base_delay.max(Duration::from_millis(1));
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Single attempt, surface the first conflict.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::from_millis(1), Duration::from_millis(1), 0.0)
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u32.saturating_pow(attempt.min(31) as u32);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);

        if self.jitter_pct == 0.0 {
            return delay;
        }

        let millis = delay.as_millis() as i64;
        let spread = (millis as f64 * self.jitter_pct) as i64;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(millis.saturating_add(delta).max(0) as u64)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    /// `op` receives the zero-based attempt number.
    pub async fn retry<F, Fut, T>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.next_delay(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after conflict"
                    );
                    attempt += 1;
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(5), Duration::from_millis(200), 0.2)
    }
}
