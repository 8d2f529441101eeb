//! I/O Abstractions
//!
//! Randomness is routed through the [`Rng`] trait so that fault injection in
//! the simulated backing store is reproducible from a seed.

pub mod simulation;

pub use simulation::SimulatedRng;

/// Source of randomness for simulated components
pub trait Rng: Send + 'static {
    /// Next raw 64-bit value
    fn next_u64(&mut self) -> u64;

    /// Uniform value in `[min, max)`; returns `min` when the range is empty
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }

    /// True with the given probability
    fn gen_bool(&mut self, probability: f64) -> bool {
        let val = self.next_u64() as f64 / u64::MAX as f64;
        val < probability
    }
}
