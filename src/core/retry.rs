//! Retry budget and backoff for the scraping service path.

use std::time::Duration;

/// Bounded retry with exponential backoff and jitter.
///
/// `max_retries` counts additional attempts after the first one, so a
/// permanently failing request is attempted `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay used as symmetric random variance.
    pub jitter: f64,
}

pub const DEFAULT_MAX_RETRIES: u32 = 5;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Retries fire back to back with no delay.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Clamped to `0.0..=1.0`; non-finite values disable jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Whether another attempt is allowed after `retries_done` retries.
    pub fn allows_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Total attempts a permanently failing request will make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let exp = 1u32 << retry.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(exp).min(self.max_delay);
        // jitter is a public field and may hold any f64.
        if !self.jitter.is_finite() || self.jitter <= 0.0 {
            return raw;
        }

        let delay = raw.as_secs_f64();
        let variance = delay * self.jitter.min(1.0);
        let jitter = rand::random::<f64>() * variance - (variance / 2.0);
        let jittered = (delay + jitter).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(jittered).unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_five_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 6);
        assert!(policy.allows_retry(4));
        assert!(!policy.allows_retry(5));
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(5);
        for retry in 1..=5 {
            assert_eq!(policy.delay_for(retry), Duration::ZERO);
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::new(20)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
            .with_jitter(0.0);

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(12), Duration::from_secs(2));
    }

    #[test]
    fn non_finite_jitter_is_ignored() {
        let policy = RetryPolicy::new(3)
            .with_base_delay(Duration::from_millis(50))
            .with_jitter(f64::NAN);
        assert_eq!(policy.jitter, 0.0);
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));

        assert_eq!(RetryPolicy::new(3).with_jitter(f64::INFINITY).jitter, 0.0);

        let raw = RetryPolicy {
            jitter: f64::NAN,
            ..RetryPolicy::new(3).with_base_delay(Duration::from_millis(50))
        };
        assert_eq!(raw.delay_for(2), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(5)
            .with_base_delay(Duration::from_millis(400))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(0.5);

        for _ in 0..200 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(299), "{delay:?}");
            assert!(delay <= Duration::from_millis(501), "{delay:?}");
            assert!(policy.delay_for(10) <= Duration::from_secs(1));
        }
    }
}
