//! Retry policy with jittered exponential back-off.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use rf_domain::config::DeliveryConfig;

/// Controls how often and how patiently the bridge retries a send.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(cfg: &DeliveryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_delay: Duration::from_millis(cfg.initial_backoff_ms),
            max_delay: Duration::from_millis(cfg.max_backoff_ms),
            backoff_factor: cfg.backoff_factor.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// No retries and no waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Delay after the given failed attempt (0-indexed).
    ///
    /// `seed` spreads the jitter across senders; see [`jitter_seed`].
    pub fn delay_for_attempt(&self, attempt: u32, seed: u64) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // Up to 25% jitter, varied per seed and attempt.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(seed, attempt);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether `attempts_made` has used up the budget.
    pub fn should_give_up(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

/// Stable jitter seed for a sender, e.g. `[user_id, run_id]`.
pub fn jitter_seed(parts: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic fraction in [0, 1) mixed from `seed` and `attempt`
/// (splitmix64 finalizer).
fn pseudo_random_fraction(seed: u64, attempt: u32) -> f64 {
    let step = u64::from(attempt).wrapping_add(1);
    let mut z = seed.wrapping_add(step.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_from_delivery_config() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.initial_delay, Duration::from_millis(100));
        assert_eq!(p.max_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn delay_grows_then_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
        };
        assert!(p.delay_for_attempt(1, 7) > p.delay_for_attempt(0, 7));
        assert!(p.delay_for_attempt(2, 7) > p.delay_for_attempt(1, 7));
        // Capped at max plus 25% jitter.
        assert!(p.delay_for_attempt(12, 7) <= Duration::from_millis(1_250));
    }

    #[test]
    fn jitter_differs_between_senders() {
        let p = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(1_000),
            backoff_factor: 1.0,
        };
        let alice = jitter_seed(&["alice", "r1"]);
        let bob = jitter_seed(&["bob", "r1"]);
        assert_ne!(alice, bob);
        assert_eq!(jitter_seed(&["alice", "r1"]), alice);

        let a: Vec<_> = (0..5).map(|n| p.delay_for_attempt(n, alice)).collect();
        let b: Vec<_> = (0..5).map(|n| p.delay_for_attempt(n, bob)).collect();
        assert_ne!(a, b);
        for d in a.iter().chain(&b) {
            assert!(*d >= Duration::from_millis(1_000));
            assert!(*d < Duration::from_millis(1_250));
        }
    }

    #[test]
    fn gives_up_after_budget() {
        let p = RetryPolicy::immediate(3);
        assert!(!p.should_give_up(2));
        assert!(p.should_give_up(3));
        assert_eq!(p.delay_for_attempt(5, 7), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let cfg = DeliveryConfig {
            max_attempts: 0,
            ..DeliveryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&cfg).max_attempts, 1);
    }
}
