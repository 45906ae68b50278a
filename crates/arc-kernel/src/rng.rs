//! Injectable randomness for stochastic triggers. The engine owns one
//! source; tests substitute a fixed sequence to pin down draws.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Uniform draws in `[0, 1)`. The only non-deterministic input the kernel
/// ever consumes.
pub trait RandomSource {
    fn draw(&mut self) -> f64;
}

/// Seeded PRNG-backed source; same seed, same draw sequence.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: SmallRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn draw(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Replays a fixed sequence of draws, then repeats the last one. Test-only
/// in spirit, but exported so integration tests can use it too.
#[derive(Debug, Clone)]
pub struct FixedRandom {
    draws: Vec<f64>,
    cursor: usize,
}

impl FixedRandom {
    pub fn new(draws: Vec<f64>) -> Self {
        Self { draws, cursor: 0 }
    }
}

impl RandomSource for FixedRandom {
    fn draw(&mut self) -> f64 {
        let value = self
            .draws
            .get(self.cursor)
            .or_else(|| self.draws.last())
            .copied()
            .unwrap_or(0.0);
        if self.cursor + 1 < self.draws.len() {
            self.cursor += 1;
        }
        value
    }
}
