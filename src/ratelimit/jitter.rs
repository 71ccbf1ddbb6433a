//! Jitter source: a seeded non-negative integer generator.
//!
//! Counter-store TTLs are exact unit lengths (see
//! [`crate::ratelimit::store`]), so this is not wired into the hot path.
//! It's kept as an injectable primitive for staggering background timing
//! (e.g. reload retry backoff) where a named jitter source is useful
//! without affecting counter-store correctness.

use rand::Rng;

pub trait JitterSource: Send + Sync {
    /// A non-negative value in `[0, bound)`. Returns 0 if `bound` is 0.
    fn next(&self, bound: u64) -> u64;
}

/// `rand`-backed jitter, reseeded from the OS per call (thread_rng).
#[derive(Debug, Default, Clone, Copy)]
pub struct RandJitter;

impl JitterSource for RandJitter {
    fn next(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Deterministic jitter for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub u64);

impl JitterSource for FixedJitter {
    fn next(&self, bound: u64) -> u64 {
        if bound == 0 {
            0
        } else {
            self.0 % bound
        }
    }
}

/// No jitter at all; TTLs are exact unit lengths.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn next(&self, _bound: u64) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_jitter_is_bounded() {
        let j = FixedJitter(7);
        assert_eq!(j.next(5), 2);
        assert_eq!(j.next(0), 0);
    }

    #[test]
    fn rand_jitter_stays_in_bound() {
        let j = RandJitter;
        for _ in 0..100 {
            assert!(j.next(10) < 10);
        }
    }
}
