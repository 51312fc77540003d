//! Poll backoff for contended acquisitions

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff with equal jitter.
///
/// The delay for attempt `n` is `initial * multiplier^n`, capped at `max`.
/// With jitter enabled the actual sleep is drawn from `[base/2, base]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(100),
            multiplier: 2,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            ..Default::default()
        }
    }

    /// Disable jitter (deterministic delays).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Un-jittered delay before retry number `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry `attempt`, never longer than `remaining`.
    pub fn delay(&self, attempt: u32, remaining: Duration) -> Duration {
        let base = self.base_delay(attempt);
        let delay = if self.jitter && !base.is_zero() {
            let floor = base / 2;
            let span = (base - floor).as_micros() as u64;
            floor + Duration::from_micros(rand::rng().random_range(0..=span))
        } else {
            base
        };
        delay.min(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base_delay_grows_then_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_millis(5));
        assert_eq!(policy.base_delay(1), Duration::from_millis(10));
        assert_eq!(policy.base_delay(2), Duration::from_millis(20));
        assert_eq!(policy.base_delay(5), Duration::from_millis(100));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_without_jitter_is_deterministic() {
        let policy = BackoffPolicy::default().without_jitter();
        assert_eq!(
            policy.delay(3, Duration::from_secs(1)),
            Duration::from_millis(40)
        );
    }

    #[test]
    fn test_delay_clamped_to_remaining() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.delay(10, Duration::from_millis(3)),
            Duration::from_millis(3)
        );
        assert_eq!(policy.delay(10, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_new_keeps_max_at_least_initial() {
        let policy = BackoffPolicy::new(Duration::from_millis(50), Duration::from_millis(10));
        assert_eq!(policy.max, Duration::from_millis(50));
    }

    proptest! {
        #[test]
        fn prop_delay_bounded(
            attempt in 0u32..64,
            initial_ms in 0u64..50,
            max_ms in 0u64..500,
            remaining_ms in 0u64..1000,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_millis(initial_ms),
                Duration::from_millis(max_ms),
            );
            let remaining = Duration::from_millis(remaining_ms);
            let delay = policy.delay(attempt, remaining);

            prop_assert!(delay <= remaining);
            prop_assert!(delay <= policy.max);
            prop_assert!(delay >= (policy.base_delay(attempt) / 2).min(remaining));
        }
    }
}
