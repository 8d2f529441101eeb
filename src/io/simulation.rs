//! Deterministic RNG for simulation testing
//!
//! Given the same seed, every fault decision made by the simulated store
//! and every operation chosen by the DST workload replays identically.

use super::Rng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded ChaCha8 generator
#[derive(Debug, Clone)]
pub struct SimulatedRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SimulatedRng {
    pub fn new(seed: u64) -> Self {
        SimulatedRng {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fisher-Yates shuffle driven by this generator
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.gen_range(0, (i + 1) as u64) as usize;
            slice.swap(i, j);
        }
    }
}

impl Rng for SimulatedRng {
    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = SimulatedRng::new(42);
        let mut b = SimulatedRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_gen_range_bounds() {
        let mut rng = SimulatedRng::new(7);
        for _ in 0..1000 {
            let v = rng.gen_range(10, 20);
            assert!((10..20).contains(&v));
        }
        assert_eq!(rng.gen_range(5, 5), 5);
    }

    #[test]
    fn test_gen_bool_extremes() {
        let mut rng = SimulatedRng::new(1);
        for _ in 0..100 {
            assert!(!rng.gen_bool(0.0));
            assert!(rng.gen_bool(1.0));
        }
    }
}
