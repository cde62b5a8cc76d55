use std::collections::HashMap;

use crate::math::tensor::Tensor;

/// SGD with momentum and L2 weight decay, matching the classic
/// `v = μ·v + (g + λ·p); p -= lr·v` update.
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    velocity: HashMap<String, Tensor>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd::with_momentum(learning_rate, 0.0, 0.0)
    }

    pub fn with_momentum(learning_rate: f64, momentum: f64, weight_decay: f64) -> Sgd {
        Sgd {
            learning_rate,
            momentum,
            weight_decay,
            velocity: HashMap::new(),
        }
    }

    /// Applies one update to the parameter registered under `key`.
    pub fn step(&mut self, key: &str, param: &mut Tensor, grad: &Tensor) {
        let v = self
            .velocity
            .entry(key.to_string())
            .or_insert_with(|| Tensor::zeros(param.shape()));
        let (lr, mu, wd) = (self.learning_rate, self.momentum, self.weight_decay);
        for ((p, g), v) in param
            .data_mut()
            .iter_mut()
            .zip(grad.data())
            .zip(v.data_mut().iter_mut())
        {
            *v = mu * *v + g + wd * *p;
            *p -= lr * *v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sgd_moves_against_gradient() {
        let mut opt = Sgd::new(0.5);
        let mut p = Tensor::from_vec(&[2], vec![1.0, 1.0]).unwrap();
        let g = Tensor::from_vec(&[2], vec![1.0, -2.0]).unwrap();
        opt.step("w", &mut p, &g);
        assert_eq!(p.data(), &[0.5, 2.0]);
    }

    #[test]
    fn momentum_accumulates_per_key() {
        let mut opt = Sgd::with_momentum(1.0, 0.9, 0.0);
        let mut p = Tensor::zeros(&[1]);
        let g = Tensor::ones(&[1]);
        opt.step("w", &mut p, &g);
        opt.step("w", &mut p, &g);
        // v1 = 1, v2 = 1.9 → p = -2.9
        assert!((p.data()[0] + 2.9).abs() < 1e-12);

        let mut q = Tensor::zeros(&[1]);
        opt.step("b", &mut q, &g);
        assert!((q.data()[0] + 1.0).abs() < 1e-12);
    }
}
