// Request spacing for rate-limited scoring APIs.
//
// Remote scorers such as Perspective allow a fixed number of queries per
// second. Each caller reserves the next free slot under the lock and then
// sleeps until that slot without holding the lock, so concurrent agents
// queue up fairly instead of all waking at once.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Enforces a minimum interval between requests across all clones.
#[derive(Clone)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    /// Allow `requests_per_second` requests per second. Non-positive rates
    /// disable limiting.
    pub fn per_second(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait until this caller's slot arrives.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}
