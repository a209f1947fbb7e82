//! Token bucket guarding outbound venue calls (§4.4).

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// `acquire()` suspends the caller until one token is available. Refill is
/// linear in wall time since the last refill, capped at `capacity`. The
/// internal `tokio::sync::Mutex` both protects the bucket and serializes
/// callers in arrival order, which is sufficient FIFO-under-mutex fairness
/// per §4.4.
pub struct RateLimiter {
    rate_per_sec: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, capacity: u32) -> Self {
        Self {
            rate_per_sec,
            capacity: capacity as f64,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            let wait_secs = (1.0 - bucket.tokens) / self.rate_per_sec;
            tokio::time::sleep(Duration::from_secs_f64(wait_secs.max(0.0))).await;
            bucket.tokens = 0.0;
            bucket.last_refill = Instant::now();
        } else {
            bucket.tokens -= 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn acquire_drains_and_refills_capacity() {
        let limiter = RateLimiter::new(1000.0, 2);
        // Two tokens available immediately.
        limiter.acquire().await;
        limiter.acquire().await;
        // Third call must wait for a refill, but at 1000/s that's ~1ms.
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn concurrent_callers_all_eventually_proceed() {
        let limiter = Arc::new(RateLimiter::new(500.0, 5));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let l = limiter.clone();
            handles.push(tokio::spawn(async move {
                l.acquire().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}
