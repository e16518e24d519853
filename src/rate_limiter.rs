//! Global token bucket shared across all outbound ERP calls (§4.1).

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket. `acquire()` suspends until a token is available;
/// it never consumes more than one token per call and never fails.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };

            match wait {
                None => return,
                Some(duration) => sleep(duration.max(Duration::from_millis(1))).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn burst_up_to_capacity_does_not_block() {
        let limiter = RateLimiter::new(9, 9);
        let start = Instant::now();
        for _ in 0..9 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn exceeding_capacity_forces_a_wait() {
        let limiter = RateLimiter::new(2, 2);
        limiter.acquire().await;
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn rate_bound_over_one_second_window() {
        // Invariant 5: over any 1s window, calls initiated <= capacity + 1.
        let limiter = Arc::new(RateLimiter::new(9, 9));
        let mut handles = Vec::new();
        for _ in 0..30 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut timestamps = Vec::new();
        for h in handles {
            timestamps.push(h.await.unwrap());
        }
        timestamps.sort();
        let start = timestamps[0];
        let within_first_second = timestamps
            .iter()
            .filter(|t| t.duration_since(start) < Duration::from_secs(1))
            .count();
        assert!(within_first_second <= 10);
    }
}
