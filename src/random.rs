//! Injectable randomness.
//!
//! Every stochastic step of the simulation (fidelity draws, heralding and
//! swapping success, E91 key material, measurement collapse) pulls from a
//! [`RandomSource`] owned by the network. Seed it for reproducible runs or
//! script it to force specific outcomes in tests.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait RandomSource {
    /// Uniform sample in `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Uniform sample in `[lo, hi)`; returns `lo` for an empty range.
    fn uniform_in(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        lo + (hi - lo) * self.uniform()
    }

    /// Fair coin.
    fn bit(&mut self) -> bool {
        self.uniform() < 0.5
    }
}

/// `StdRng`-backed source.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded from OS entropy; runs are not reproducible.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn uniform_in(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..hi)
    }

    fn bit(&mut self) -> bool {
        self.rng.gen()
    }
}

/// Replays a fixed queue of uniform draws, then repeats `fallback`.
///
/// A draw of `0.0` makes every "sample below p" check succeed; a draw close
/// to `1.0` makes it fail.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    draws: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedRandom {
    pub fn new<I>(draws: I, fallback: f64) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        Self {
            draws: draws.into_iter().collect(),
            fallback,
        }
    }

    /// Every draw returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(std::iter::empty(), value)
    }

    /// Number of scripted draws not yet consumed.
    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl RandomSource for ScriptedRandom {
    fn uniform(&mut self) -> f64 {
        self.draws.pop_front().unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SeededRandom::new(12345);
        let mut b = SeededRandom::new(12345);
        let xs: Vec<f64> = (0..16).map(|_| a.uniform()).collect();
        let ys: Vec<f64> = (0..16).map(|_| b.uniform()).collect();
        assert_eq!(xs, ys);

        let mut c = SeededRandom::new(54321);
        let zs: Vec<f64> = (0..16).map(|_| c.uniform()).collect();
        assert_ne!(xs, zs);
    }

    #[test]
    fn uniform_in_stays_in_range() {
        let mut rng = SeededRandom::new(7);
        for _ in 0..1000 {
            let x = rng.uniform_in(0.2, 1.0);
            assert!((0.2..1.0).contains(&x));
        }
        assert_eq!(rng.uniform_in(0.5, 0.5), 0.5);
    }

    #[test]
    fn scripted_draws_replay_then_fall_back() {
        let mut rng = ScriptedRandom::new([0.1, 0.9], 0.5);
        assert_eq!(rng.remaining(), 2);
        assert_eq!(rng.uniform(), 0.1);
        assert_eq!(rng.uniform(), 0.9);
        assert_eq!(rng.uniform(), 0.5);
        assert_eq!(rng.remaining(), 0);
    }

    #[test]
    fn scripted_range_is_affine() {
        let mut rng = ScriptedRandom::constant(0.5);
        assert!((rng.uniform_in(0.2, 1.0) - 0.6).abs() < 1e-12);
        assert!(!rng.bit());
        let mut low = ScriptedRandom::constant(0.0);
        assert!(low.bit());
    }
}
