use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

// Type alias for the rate limiter to simplify signatures
type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Outbound request pool shared by every upstream call
///
/// Bounds the number of in-flight requests and paces them against a
/// per-minute quota. Cloning is cheap; all clones share one pool.
#[derive(Clone)]
pub struct RequestPool {
    permits: Arc<Semaphore>,
    rate_limiter: Arc<DirectRateLimiter>,
    max_concurrent: usize,
}

/// Held for the duration of one request; dropping it releases the slot
pub struct PoolPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RequestPool {
    pub fn new(max_concurrent: usize, requests_per_minute: u32) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(rpm);

        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            max_concurrent,
        }
    }

    /// Wait for a concurrency slot, then for the rate limiter
    pub async fn acquire(&self) -> PoolPermit {
        // The semaphore is never closed, so acquisition only fails after shutdown
        let permit = self.permits.clone().acquire_owned().await.ok();
        self.rate_limiter.until_ready().await;
        PoolPermit { _permit: permit }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
