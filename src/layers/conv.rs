use rand::Rng;

use crate::activation::ActivationFunction;
use crate::error::{PruneError, Result};
use crate::layers::masked::{Gradients, LayerMask, MaskableLayer};
use crate::math::tensor::Tensor;

pub const KERNEL: usize = 3;
const PAD: isize = 1;

/// 3×3 stride-1 "same" convolution followed by ReLU, with a persistent mask
/// multiplied into the weights (and bias, if masked) on every forward pass.
#[derive(Debug, Clone)]
pub struct MaskedConv2d {
    name: String,
    pub in_channels: usize,
    pub out_channels: usize,
    pub weights: Tensor,
    pub bias: Tensor,
    mask: LayerMask,
    input: Tensor,
    pre_activation: Tensor,
    output: Tensor,
}

impl MaskedConv2d {
    pub fn new<R: Rng>(name: &str, in_channels: usize, out_channels: usize, rng: &mut R) -> Self {
        let shape = [out_channels, in_channels, KERNEL, KERNEL];
        MaskedConv2d {
            name: name.to_string(),
            in_channels,
            out_channels,
            weights: Tensor::he(&shape, in_channels * KERNEL * KERNEL, rng),
            bias: Tensor::zeros(&[out_channels]),
            mask: LayerMask::keep_all(&shape, None),
            input: Tensor::zeros(&[0]),
            pre_activation: Tensor::zeros(&[0]),
            output: Tensor::zeros(&[0]),
        }
    }

    fn effective_params(&self) -> (Tensor, Tensor) {
        let w = self.weights.hadamard(&self.mask.weight);
        let b = match &self.mask.bias {
            Some(m) => self.bias.hadamard(m),
            None => self.bias.clone(),
        };
        (w, b)
    }

    /// Forward pass over one `[in, h, w]` sample; caches what backward needs.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let (h, w) = match input.shape() {
            [c, h, w] if *c == self.in_channels => (*h, *w),
            other => {
                return Err(PruneError::ShapeMismatch {
                    what: format!("{} input", self.name),
                    expected: vec![self.in_channels, 0, 0],
                    got: other.to_vec(),
                })
            }
        };
        let (w_eff, b_eff) = self.effective_params();
        let (wd, bd, x) = (w_eff.data(), b_eff.data(), input.data());
        let mut z = Tensor::zeros(&[self.out_channels, h, w]);
        let zd = z.data_mut();

        for o in 0..self.out_channels {
            for y in 0..h {
                for xx in 0..w {
                    let mut sum = bd[o];
                    for i in 0..self.in_channels {
                        for ky in 0..KERNEL {
                            let iy = y as isize + ky as isize - PAD;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..KERNEL {
                                let ix = xx as isize + kx as isize - PAD;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                let wi = ((o * self.in_channels + i) * KERNEL + ky) * KERNEL + kx;
                                let xi = (i * h + iy as usize) * w + ix as usize;
                                sum += wd[wi] * x[xi];
                            }
                        }
                    }
                    zd[(o * h + y) * w + xx] = sum;
                }
            }
        }

        let mut a = z.clone();
        a.data_mut()
            .iter_mut()
            .for_each(|v| *v = ActivationFunction::ReLU.function(*v));
        self.input = input.clone();
        self.pre_activation = z;
        self.output = a.clone();
        Ok(a)
    }

    /// Backward pass for the most recent forward call.
    ///
    /// `grad_output` is ∂L/∂a for this layer's output. Returns ∂L/∂input and
    /// the parameter gradients; masked positions get exactly zero gradient.
    pub fn backward(&self, grad_output: &Tensor) -> (Tensor, Gradients) {
        let (h, w) = (self.input.shape()[1], self.input.shape()[2]);
        let (w_eff, _) = self.effective_params();
        let wd = w_eff.data();
        let x = self.input.data();
        let z = self.pre_activation.data();
        let g = grad_output.data();

        let mut grads = Gradients::zeros(self.weights.shape(), self.out_channels);
        let mut grad_input = Tensor::zeros(self.input.shape());
        {
            let gw = grads.weight.data_mut();
            let gi = grad_input.data_mut();
            for o in 0..self.out_channels {
                let mut gb = 0.0;
                for y in 0..h {
                    for xx in 0..w {
                        let idx = (o * h + y) * w + xx;
                        let delta = g[idx] * ActivationFunction::ReLU.derivative(z[idx]);
                        if delta == 0.0 {
                            continue;
                        }
                        gb += delta;
                        for i in 0..self.in_channels {
                            for ky in 0..KERNEL {
                                let iy = y as isize + ky as isize - PAD;
                                if iy < 0 || iy >= h as isize {
                                    continue;
                                }
                                for kx in 0..KERNEL {
                                    let ix = xx as isize + kx as isize - PAD;
                                    if ix < 0 || ix >= w as isize {
                                        continue;
                                    }
                                    let wi = ((o * self.in_channels + i) * KERNEL + ky) * KERNEL + kx;
                                    let xi = (i * h + iy as usize) * w + ix as usize;
                                    gw[wi] += delta * x[xi];
                                    gi[xi] += delta * wd[wi];
                                }
                            }
                        }
                    }
                }
                grads.bias.data_mut()[o] = gb;
            }
        }

        grads.weight = grads.weight.hadamard(&self.mask.weight);
        if let Some(m) = &self.mask.bias {
            grads.bias = grads.bias.hadamard(m);
        }
        (grad_input, grads)
    }

    pub fn output(&self) -> &Tensor {
        &self.output
    }
}

impl MaskableLayer for MaskedConv2d {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight_shape(&self) -> &[usize] {
        self.weights.shape()
    }

    fn units(&self) -> usize {
        self.out_channels
    }

    fn set_mask(&mut self, mask: LayerMask) -> Result<()> {
        mask.validate(&self.name, self.weights.shape(), self.out_channels)?;
        self.mask = mask;
        Ok(())
    }

    fn mask(&self) -> &LayerMask {
        &self.mask
    }

    fn unit_activations(&self) -> Vec<f64> {
        if self.output.is_empty() {
            return vec![0.0; self.out_channels];
        }
        let plane = self.output.row_len();
        self.output
            .data()
            .chunks(plane)
            .map(|ch| ch.iter().map(|v| v.abs()).sum::<f64>() / plane as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn layer(in_ch: usize, out_ch: usize) -> MaskedConv2d {
        MaskedConv2d::new("conv", in_ch, out_ch, &mut StdRng::seed_from_u64(3))
    }

    #[test]
    fn identity_kernel_reproduces_positive_input() {
        let mut conv = layer(1, 1);
        conv.weights.fill(0.0);
        conv.weights.data_mut()[4] = 1.0; // centre tap
        let input = Tensor::from_vec(&[1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = conv.forward(&input).unwrap();
        assert_eq!(out.data(), input.data());
    }

    #[test]
    fn masked_filter_outputs_relu_of_bias_only() {
        let mut conv = layer(2, 3);
        conv.bias.fill(0.0);
        let mut mask = LayerMask::keep_all(&[3, 2, 3, 3], None);
        let row = mask.weight.row_len();
        mask.weight.data_mut()[row..2 * row].iter_mut().for_each(|v| *v = 0.0);
        conv.set_mask(mask).unwrap();
        let input = Tensor::filled(&[2, 4, 4], 1.0);
        let out = conv.forward(&input).unwrap();
        assert!(out.data()[16..32].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn set_mask_rejects_wrong_shape_and_keeps_old_mask() {
        let mut conv = layer(2, 3);
        let before = conv.mask().clone();
        let err = conv.set_mask(LayerMask::keep_all(&[3, 3, 3, 3], None)).unwrap_err();
        assert!(matches!(err, PruneError::ShapeMismatch { .. }));
        assert_eq!(conv.mask(), &before);
    }

    #[test]
    fn masked_weights_receive_zero_gradient() {
        let mut conv = layer(2, 2);
        conv.bias.fill(1.0);
        let mut mask = LayerMask::keep_all(&[2, 2, 3, 3], None);
        let row = mask.weight.row_len();
        mask.weight.data_mut()[..row].iter_mut().for_each(|v| *v = 0.0);
        conv.set_mask(mask).unwrap();
        let input = Tensor::filled(&[2, 3, 3], 0.5);
        let out = conv.forward(&input).unwrap();
        let (_, grads) = conv.backward(&Tensor::ones(out.shape()));
        assert!(grads.weight.data()[..row].iter().all(|v| *v == 0.0));
        assert!(grads.weight.data()[row..].iter().any(|v| *v != 0.0));
    }

    #[test]
    fn weight_gradient_matches_finite_difference() {
        let mut conv = layer(1, 1);
        let input = Tensor::from_vec(&[1, 3, 3], vec![0.2, 0.4, 0.1, 0.9, 0.5, 0.3, 0.7, 0.8, 0.6]).unwrap();
        conv.weights.fill(0.1);
        let out = conv.forward(&input).unwrap();
        let (_, grads) = conv.backward(&Tensor::ones(out.shape()));

        let eps = 1e-6;
        let base: f64 = out.data().iter().sum();
        conv.weights.data_mut()[0] += eps;
        let bumped: f64 = conv.forward(&input).unwrap().data().iter().sum();
        let numeric = (bumped - base) / eps;
        assert!((numeric - grads.weight.data()[0]).abs() < 1e-4);
    }
}
