use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::Tensor;
use crate::network::InputShape;

/// Gaussian-blob classification task: every class owns a random prototype
/// image and samples are that prototype plus uniform noise.
///
/// Used for smoke runs and tests where real image data is unavailable.
#[derive(Debug, Clone)]
pub struct SyntheticTask {
    prototypes: Vec<Tensor>,
    noise: f64,
}

impl SyntheticTask {
    pub fn new(num_classes: usize, shape: InputShape, noise: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let dims = shape.dims();
        let prototypes = (0..num_classes)
            .map(|_| {
                let mut t = Tensor::zeros(&dims);
                t.data_mut()
                    .iter_mut()
                    .for_each(|v| *v = rng.gen_range(-1.0..1.0));
                t
            })
            .collect();
        SyntheticTask { prototypes, noise }
    }

    pub fn num_classes(&self) -> usize {
        self.prototypes.len()
    }

    /// Draws `n` samples with labels cycling through the classes.
    pub fn sample(&self, n: usize, seed: u64) -> (Vec<Tensor>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let classes = self.prototypes.len();
        (0..n)
            .map(|i| {
                let label = i % classes;
                let mut x = self.prototypes[label].clone();
                if self.noise > 0.0 {
                    x.data_mut()
                        .iter_mut()
                        .for_each(|v| *v += rng.gen_range(-self.noise..self.noise));
                }
                (x, label)
            })
            .unzip()
    }
}
