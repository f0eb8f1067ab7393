//! TTL Computation
//!
//! Resolves the effective TTL of a write and spreads expirations with a
//! random variation so entries written together do not expire together.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of TTL variation
pub trait Jitter: Send + Sync {
    /// Sample a duration in `[0, bound]`
    fn sample(&self, bound: Duration) -> Duration;
}

/// Uniform variation from the thread-local RNG, millisecond resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, bound: Duration) -> Duration {
        let max = bound.as_millis().min(u64::MAX as u128) as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Uniform variation from a seeded RNG, reproducible across runs
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Create from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Jitter for SeededJitter {
    fn sample(&self, bound: Duration) -> Duration {
        let max = bound.as_millis().min(u64::MAX as u128) as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.lock().gen_range(0..=max))
    }
}

/// Always the same variation, clamped to the bound
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub Duration);

impl Jitter for FixedJitter {
    fn sample(&self, bound: Duration) -> Duration {
        self.0.min(bound)
    }
}

/// Default TTL plus variation bound
#[derive(Clone)]
pub struct TtlPolicy {
    default_ttl: Option<Duration>,
    variation: Duration,
    jitter: Arc<dyn Jitter>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(None, Duration::ZERO)
    }
}

impl TtlPolicy {
    /// Policy using [`RandomJitter`]
    pub fn new(default_ttl: Option<Duration>, variation: Duration) -> Self {
        Self {
            default_ttl,
            variation,
            jitter: Arc::new(RandomJitter),
        }
    }

    /// Replace the variation source
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Default TTL
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Set the default TTL
    pub fn set_default_ttl(&mut self, ttl: Option<Duration>) {
        self.default_ttl = ttl;
    }

    /// Maximum variation added to a TTL
    pub fn variation(&self) -> Duration {
        self.variation
    }

    /// Set the maximum variation
    pub fn set_variation(&mut self, variation: Duration) {
        self.variation = variation;
    }

    /// Variation source
    pub fn jitter(&self) -> &Arc<dyn Jitter> {
        &self.jitter
    }

    /// Same jitter and variation, different default TTL
    pub fn inherit(&self, default_ttl: Option<Duration>) -> Self {
        Self {
            default_ttl: default_ttl.or(self.default_ttl),
            variation: self.variation,
            jitter: Arc::clone(&self.jitter),
        }
    }

    /// Effective TTL of a write.
    ///
    /// `None` in, no default configured: `None` out, meaning no expiration.
    pub fn compute(&self, ttl: Option<Duration>) -> Option<Duration> {
        let ttl = ttl.or(self.default_ttl)?;
        let variation = self.jitter.sample(self.variation).min(self.variation);
        Some(ttl.saturating_add(variation))
    }
}

impl std::fmt::Debug for TtlPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlPolicy")
            .field("default_ttl", &self.default_ttl)
            .field("variation", &self.variation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ttl_means_no_expiration() {
        let policy = TtlPolicy::new(None, Duration::from_secs(10));
        assert_eq!(policy.compute(None), None);
    }

    #[test]
    fn test_default_ttl_applies() {
        let policy = TtlPolicy::new(Some(Duration::from_secs(60)), Duration::ZERO);
        assert_eq!(policy.compute(None), Some(Duration::from_secs(60)));
        assert_eq!(
            policy.compute(Some(Duration::from_secs(5))),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_variation_bound() {
        let policy = TtlPolicy::new(None, Duration::from_secs(10));
        for _ in 0..200 {
            let ttl = policy.compute(Some(Duration::from_secs(10))).unwrap();
            assert!(ttl >= Duration::from_secs(10));
            assert!(ttl <= Duration::from_secs(20));
        }
    }

    #[test]
    fn test_fixed_jitter_is_clamped() {
        let policy = TtlPolicy::new(None, Duration::from_secs(3))
            .with_jitter(Arc::new(FixedJitter(Duration::from_secs(7))));
        assert_eq!(
            policy.compute(Some(Duration::from_secs(10))),
            Some(Duration::from_secs(13))
        );
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let a = SeededJitter::new(42);
        let b = SeededJitter::new(42);
        let bound = Duration::from_secs(30);
        for _ in 0..20 {
            assert_eq!(a.sample(bound), b.sample(bound));
        }
    }

    #[test]
    fn test_inherit_keeps_default_unless_overridden() {
        let policy = TtlPolicy::new(Some(Duration::from_secs(60)), Duration::from_secs(5));
        assert_eq!(policy.inherit(None).default_ttl(), Some(Duration::from_secs(60)));
        let child = policy.inherit(Some(Duration::from_secs(1)));
        assert_eq!(child.default_ttl(), Some(Duration::from_secs(1)));
        assert_eq!(child.variation(), Duration::from_secs(5));
    }
}
