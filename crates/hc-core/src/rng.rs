//! The single deterministic PRNG behind every stochastic draw.
//!
//! # Determinism strategy
//!
//! The whole simulation shares one `SimRng`, seeded from
//! `SimParams::seed` at model construction.  Agent activation order, event
//! draws, and perturbation sampling all pull from it in a fixed sequence,
//! so two runs with equal inputs and seed produce identical timelines.
//! There is deliberately no per-agent RNG: the tick loop is strictly
//! sequential and a single stream keeps replay trivial.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::time::Minute;

/// Seeded simulation-wide RNG.
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Sample a uniformly distributed value of any `Standard`-distributed type.
    #[inline]
    pub fn random<T>(&mut self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.0.r#gen()
    }

    /// Generate a value uniformly in `range`.
    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.0.gen_range(range)
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Shuffle a mutable slice in-place (Fisher–Yates).
    #[inline]
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        use rand::seq::SliceRandom;
        slice.shuffle(&mut self.0);
    }

    /// Choose a random element from a slice; `None` if the slice is empty.
    #[inline]
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut self.0)
    }

    // ── Perturbation sampling ─────────────────────────────────────────────

    /// Sample a triangular(min, mode, max) duration, truncated to minutes.
    ///
    /// Inverse-CDF sampling; used for prolonged visits and travels.
    pub fn triangular(&mut self, min: Minute, mode: Minute, max: Minute) -> Minute {
        let (a, c, b) = (min as f64, mode as f64, max as f64);
        let u: f64 = self.0.r#gen();
        let x = if u < (c - a) / (b - a) {
            a + (u * (b - a) * (c - a)).sqrt()
        } else {
            b - ((1.0 - u) * (b - a) * (b - c)).sqrt()
        };
        x as Minute
    }

    /// Uniform noise in `[-bound, bound]`, inclusive on both ends.
    pub fn noise(&mut self, bound: Minute) -> Minute {
        self.0.gen_range(-bound..=bound)
    }
}
