//! Bounded exponential backoff.

use std::time::Duration;

/// Retry schedule for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay honoring a server-provided retry-after hint, still capped.
    pub fn delay_with_hint(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let backoff = self.delay_for(attempt);
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs).max(backoff).min(self.max_delay),
            None => backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_then_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
        assert_eq!(p.delay_for(10), Duration::from_secs(8));
        assert_eq!(p.delay_for(40), Duration::from_secs(8));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_with_hint(1, Some(3)), Duration::from_secs(3));
        assert_eq!(p.delay_with_hint(1, Some(600)), Duration::from_secs(8));
        assert_eq!(p.delay_with_hint(2, None), Duration::from_secs(1));
    }
}
