use crate::error::{PruneError, Result};
use crate::math::tensor::Tensor;

/// 2×2 stride-2 max pooling. Channels pass through untouched, which is what
/// lets channel pruning propagate across pooling stages.
#[derive(Debug, Clone, Default)]
pub struct MaxPool2 {
    input_shape: Vec<usize>,
    winners: Vec<usize>,
}

impl MaxPool2 {
    pub fn new() -> Self {
        MaxPool2::default()
    }

    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let (c, h, w) = match input.shape() {
            [c, h, w] if h % 2 == 0 && w % 2 == 0 => (*c, *h, *w),
            other => {
                return Err(PruneError::ShapeMismatch {
                    what: "max-pool input (even spatial dims)".to_string(),
                    expected: vec![0, 2, 2],
                    got: other.to_vec(),
                })
            }
        };
        let (oh, ow) = (h / 2, w / 2);
        let x = input.data();
        let mut out = Tensor::zeros(&[c, oh, ow]);
        let mut winners = vec![0; c * oh * ow];
        let od = out.data_mut();

        for ch in 0..c {
            for y in 0..oh {
                for xx in 0..ow {
                    let mut best = (ch * h + 2 * y) * w + 2 * xx;
                    for (dy, dx) in [(0, 1), (1, 0), (1, 1)] {
                        let idx = (ch * h + 2 * y + dy) * w + 2 * xx + dx;
                        if x[idx] > x[best] {
                            best = idx;
                        }
                    }
                    let o = (ch * oh + y) * ow + xx;
                    od[o] = x[best];
                    winners[o] = best;
                }
            }
        }

        self.input_shape = input.shape().to_vec();
        self.winners = winners;
        Ok(out)
    }

    /// Routes each output gradient back to the input position that won the max.
    pub fn backward(&self, grad_output: &Tensor) -> Tensor {
        let mut grad_input = Tensor::zeros(&self.input_shape);
        let gi = grad_input.data_mut();
        for (g, &src) in grad_output.data().iter().zip(&self.winners) {
            gi[src] += g;
        }
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_window_maximum_and_routes_gradient() {
        let input = Tensor::from_vec(
            &[1, 2, 4],
            vec![1.0, 5.0, 2.0, 0.0, 3.0, 4.0, 8.0, 1.0],
        )
        .unwrap();
        let mut pool = MaxPool2::new();
        let out = pool.forward(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1, 2]);
        assert_eq!(out.data(), &[5.0, 8.0]);

        let grad = pool.backward(&Tensor::from_vec(&[1, 1, 2], vec![1.0, 2.0]).unwrap());
        assert_eq!(grad.data(), &[0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn rejects_odd_spatial_dims() {
        let mut pool = MaxPool2::new();
        assert!(pool.forward(&Tensor::zeros(&[1, 3, 4])).is_err());
    }
}
