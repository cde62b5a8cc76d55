use rand::Rng;

use crate::activation::ActivationFunction;
use crate::error::{PruneError, Result};
use crate::layers::masked::{Gradients, LayerMask, MaskableLayer};
use crate::math::tensor::Tensor;

/// Fully connected layer with weight and bias masks.
///
/// Weights are stored `[out, in]`, so pruning an output unit zeroes a row and
/// pruning an incoming feature zeroes a column.
#[derive(Debug, Clone)]
pub struct MaskedLinear {
    name: String,
    pub size: usize,
    pub input_size: usize,
    pub weights: Tensor,
    pub biases: Tensor,
    pub activator: ActivationFunction,
    mask: LayerMask,
    input: Vec<f64>,
    pre_neurons: Vec<f64>,
    neurons: Vec<f64>,
}

impl MaskedLinear {
    pub fn new<R: Rng>(
        name: &str,
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> MaskedLinear {
        let shape = [size, input_size];
        MaskedLinear {
            name: name.to_string(),
            size,
            input_size,
            weights: Tensor::he(&shape, input_size, rng),
            biases: Tensor::zeros(&[size]),
            activator: activation,
            mask: LayerMask::keep_all(&shape, Some(size)),
            input: Vec::new(),
            pre_neurons: Vec::new(),
            neurons: Vec::new(),
        }
    }

    fn effective_params(&self) -> (Tensor, Tensor) {
        let w = self.weights.hadamard(&self.mask.weight);
        let b = match &self.mask.bias {
            Some(m) => self.biases.hadamard(m),
            None => self.biases.clone(),
        };
        (w, b)
    }

    pub fn feed_from(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_size {
            return Err(PruneError::ShapeMismatch {
                what: format!("{} input", self.name),
                expected: vec![self.input_size],
                got: vec![input.len()],
            });
        }
        let (w_eff, b_eff) = self.effective_params();
        let z: Vec<f64> = w_eff
            .data()
            .chunks(self.input_size)
            .zip(b_eff.data())
            .map(|(row, b)| b + row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>())
            .collect();
        let a: Vec<f64> = z.iter().map(|v| self.activator.function(*v)).collect();
        self.input = input.to_vec();
        self.pre_neurons = z;
        self.neurons = a.clone();
        Ok(a)
    }

    /// Computes gradients for the most recent `feed_from` call.
    /// `next_layer_delta` is ∂L/∂a for this layer (error in activation space).
    /// Returns (∂L/∂input, parameter gradients).
    pub fn compute_gradients(&self, next_layer_delta: &[f64]) -> (Vec<f64>, Gradients) {
        let (w_eff, _) = self.effective_params();
        // δ = error ⊙ σ'(z)
        let delta: Vec<f64> = next_layer_delta
            .iter()
            .zip(&self.pre_neurons)
            .map(|(e, z)| e * self.activator.derivative(*z))
            .collect();

        let mut grads = Gradients::zeros(self.weights.shape(), self.size);
        let mut grad_input = vec![0.0; self.input_size];
        {
            let gw = grads.weight.data_mut();
            for (o, d) in delta.iter().enumerate() {
                if *d == 0.0 {
                    continue;
                }
                let row = o * self.input_size;
                for i in 0..self.input_size {
                    gw[row + i] = d * self.input[i];
                    grad_input[i] += d * w_eff.data()[row + i];
                }
            }
        }
        grads.bias.data_mut().copy_from_slice(&delta);

        grads.weight = grads.weight.hadamard(&self.mask.weight);
        if let Some(m) = &self.mask.bias {
            grads.bias = grads.bias.hadamard(m);
        }
        (grad_input, grads)
    }

    pub fn neurons(&self) -> &[f64] {
        &self.neurons
    }
}

impl MaskableLayer for MaskedLinear {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight_shape(&self) -> &[usize] {
        self.weights.shape()
    }

    fn units(&self) -> usize {
        self.size
    }

    fn set_mask(&mut self, mask: LayerMask) -> Result<()> {
        mask.validate(&self.name, self.weights.shape(), self.size)?;
        self.mask = mask;
        Ok(())
    }

    fn mask(&self) -> &LayerMask {
        &self.mask
    }

    fn unit_activations(&self) -> Vec<f64> {
        if self.neurons.is_empty() {
            return vec![0.0; self.size];
        }
        self.neurons.iter().map(|v| v.abs()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn layer(size: usize, input_size: usize) -> MaskedLinear {
        let mut l = MaskedLinear::new(
            "fc",
            size,
            input_size,
            ActivationFunction::Identity,
            &mut StdRng::seed_from_u64(11),
        );
        l.weights.fill(1.0);
        l.biases.fill(0.5);
        l
    }

    #[test]
    fn forward_applies_weight_and_bias_masks() {
        let mut fc = layer(2, 3);
        let mut mask = LayerMask::keep_all(&[2, 3], Some(2));
        mask.weight.data_mut()[1] = 0.0; // unit 0 loses input 1
        mask.bias.as_mut().unwrap().data_mut()[1] = 0.0;
        fc.set_mask(mask).unwrap();
        let out = fc.feed_from(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(out, vec![1.0 + 3.0 + 0.5, 6.0]);
    }

    #[test]
    fn rejects_wrong_input_width() {
        let mut fc = layer(2, 3);
        assert!(matches!(
            fc.feed_from(&[1.0]).unwrap_err(),
            PruneError::ShapeMismatch { .. }
        ));
    }

    #[test]
    fn mask_shape_is_checked_at_set_time() {
        let mut fc = layer(2, 3);
        assert!(fc.set_mask(LayerMask::keep_all(&[3, 2], Some(2))).is_err());
        assert!(fc.set_mask(LayerMask::keep_all(&[2, 3], Some(3))).is_err());
        assert!(fc.set_mask(LayerMask::keep_all(&[2, 3], Some(2))).is_ok());
    }

    #[test]
    fn gradients_respect_mask() {
        let mut fc = layer(2, 2);
        let mut mask = LayerMask::keep_all(&[2, 2], Some(2));
        mask.weight.data_mut()[2] = 0.0;
        mask.weight.data_mut()[3] = 0.0;
        mask.bias.as_mut().unwrap().data_mut()[1] = 0.0;
        fc.set_mask(mask).unwrap();
        fc.feed_from(&[1.0, -1.0]).unwrap();
        let (grad_in, grads) = fc.compute_gradients(&[1.0, 1.0]);
        assert_eq!(grads.weight.data(), &[1.0, -1.0, 0.0, 0.0]);
        assert_eq!(grads.bias.data(), &[1.0, 0.0]);
        // Only unit 0 contributes back through its unmasked weights.
        assert_eq!(grad_in, vec![1.0, 1.0]);
    }
}
