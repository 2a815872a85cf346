use super::{ClientError, ClientResult, RequestPool};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for transient upstream failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline applied to every single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: base * 2^(attempt-1), capped,
    /// plus up to 25% random jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);

        let jitter_cap = delay.as_millis() as u64 / 4;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }
}

/// Run `op` through the request pool, retrying transient failures
///
/// The pool slot is held only while a request is in flight, never during
/// the backoff sleep. Non-transient errors are returned immediately.
pub async fn with_retry<T, F, Fut>(
    pool: &RequestPool,
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = {
            let _permit = pool.acquire().await;
            match tokio::time::timeout(policy.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout(policy.attempt_timeout)),
            }
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    request = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
