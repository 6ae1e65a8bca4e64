//! Gaussian sensor noise.
//!
//! Every pose scalar and every point coordinate receives its own zero-mean
//! Gaussian draw; no two fields share an offset.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::source::Sample;

/// Default noise standard deviation.
pub const DEFAULT_STDDEV: f32 = 0.5;

/// Perturbs samples with independent Gaussian noise.
pub struct NoiseInjector {
    rng: StdRng,
    stddev: f32,
}

impl NoiseInjector {
    /// Create an injector with the given standard deviation.
    ///
    /// A `seed` of 0 draws from OS entropy; any other value gives a
    /// reproducible sequence.
    pub fn new(stddev: f32, seed: u64) -> Self {
        let rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        Self { rng, stddev }
    }

    pub fn stddev(&self) -> f32 {
        self.stddev
    }

    fn draw(&mut self) -> f32 {
        let n: f32 = self.rng.sample(StandardNormal);
        n * self.stddev
    }

    /// Add noise to the 6 pose scalars and to x/y/z of every point.
    pub fn apply(&mut self, sample: &mut Sample) {
        for v in sample.position.iter_mut().chain(sample.rotation_deg.iter_mut()) {
            *v += self.draw();
        }
        for p in &mut sample.points {
            p.x += self.draw();
            p.y += self.draw();
            p.z += self.draw();
        }
    }
}
