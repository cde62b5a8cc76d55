use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{PruneError, Result};

/// Dense row-major f64 buffer with an explicit shape.
///
/// Conv weights are `[out, in, kh, kw]`, linear weights `[out, in]`,
/// activations `[channels, height, width]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Unchecked wire form; every decoded tensor goes through `from_vec`.
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = PruneError;

    fn try_from(raw: RawTensor) -> Result<Tensor> {
        Tensor::from_vec(&raw.shape, raw.data)
    }
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor::filled(shape, 0.0)
    }

    pub fn ones(shape: &[usize]) -> Tensor {
        Tensor::filled(shape, 1.0)
    }

    pub fn filled(shape: &[usize], value: f64) -> Tensor {
        let len = shape.iter().product();
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; len],
        }
    }

    /// Wraps `data`, checking that it holds exactly `prod(shape)` values.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(PruneError::ShapeMismatch {
                what: "tensor data".to_string(),
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor {
            shape: shape.to_vec(),
            data,
        })
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Used for every conv and linear layer since they all feed a ReLU
    /// (or the softmax head, where the scale is harmless).
    pub fn he<R: Rng>(shape: &[usize], fan_in: usize, rng: &mut R) -> Tensor {
        let std_dev = (2.0 / fan_in.max(1) as f64).sqrt();
        let mut res = Tensor::zeros(shape);
        for v in res.data.iter_mut() {
            *v = sample_standard_normal(rng) * std_dev;
        }
        res
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element-wise product. Callers guarantee equal shapes (masks are
    /// shape-checked when they are installed).
    pub fn hadamard(&self, other: &Tensor) -> Tensor {
        debug_assert_eq!(self.shape, other.shape);
        Tensor {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a * b)
                .collect(),
        }
    }

    pub fn count_zeros(&self) -> usize {
        self.data.iter().filter(|v| **v == 0.0).count()
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Size of everything after the leading axis, e.g. `in * kh * kw` for a
    /// conv weight.
    pub fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

/// Samples a single value from N(0, 1) using the Box-Muller transform.
fn sample_standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // (0, 1] keeps ln() finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
