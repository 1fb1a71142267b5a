//! Deterministic random source
//!
//! A linear congruential generator with the constants used by d3-force, so
//! layouts are reproducible across runs and platforms.

const MULTIPLIER: u32 = 1_664_525;
const INCREMENT: u32 = 1_013_904_223;
const MODULUS: f64 = 4_294_967_296.0;

/// Seedable linear congruential generator producing values in `[0, 1)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Create a generator starting from `seed`
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next value in `[0, 1)`
    pub fn next_f64(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT);
        f64::from(self.state) / MODULUS
    }

    /// Next value in `[0, 1)`, narrowed to `f32`
    pub fn next_f32(&mut self) -> f32 {
        // Narrowing can round up to exactly 1.0
        (self.next_f64() as f32).min(1.0 - f32::EPSILON)
    }

    /// Next index in `0..bound`; `bound` must be non-zero
    pub fn next_index(&mut self, bound: usize) -> usize {
        ((self.next_f64() * bound as f64) as usize).min(bound.saturating_sub(1))
    }
}

impl Default for Lcg {
    fn default() -> Self {
        Self::new(1)
    }
}
