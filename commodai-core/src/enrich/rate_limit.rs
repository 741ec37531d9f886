//! Token bucket shared by all enrichment workers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Global request budget: `rate_per_sec` sustained, bursts up to `burst`.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate_per_sec: f64,
    burst: f64,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
            rate_per_sec: rate_per_sec.max(f64::MIN_POSITIVE),
            burst,
        }
    }

    /// Take a token if one is available, otherwise report how long until one is.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(missing / self.rate_per_sec))
        }
    }

    /// Block until a token is available or `deadline` passes.
    ///
    /// Returns `false` if the deadline was reached first.
    pub fn acquire_until(&self, deadline: Option<Instant>) -> bool {
        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return true,
                Err(wait) => wait,
            };
            let wait = match deadline {
                Some(d) => {
                    let left = d.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return false;
                    }
                    wait.min(left)
                }
                None => wait,
            };
            std::thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_empty() {
        let bucket = TokenBucket::new(0.001, 3);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait > Duration::from_secs(1));
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(200.0, 1);
        assert!(bucket.try_acquire().is_ok());
        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.try_acquire().is_ok());
    }

    #[test]
    fn deadline_stops_waiting() {
        let bucket = TokenBucket::new(0.001, 1);
        assert!(bucket.acquire_until(None));
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(!bucket.acquire_until(Some(deadline)));
    }
}
