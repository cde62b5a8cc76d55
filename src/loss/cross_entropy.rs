use crate::activation::softmax;

/// Categorical cross-entropy on raw logits (softmax folded in).
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// L = -log(softmax(logits)[label])
    pub fn loss(logits: &[f64], label: usize) -> f64 {
        let p = softmax(logits);
        -(p[label] + EPS).ln()
    }

    /// Gradient of the combined softmax + cross-entropy w.r.t. the logits:
    ///   ∂L/∂z_i = p_i - 1[i == label]
    pub fn derivative(logits: &[f64], label: usize) -> Vec<f64> {
        let mut p = softmax(logits);
        p[label] -= 1.0;
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_logits_give_log_classes() {
        let l = CrossEntropyLoss::loss(&[0.0; 4], 2);
        assert!((l - 4f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn gradient_sums_to_zero_and_is_negative_at_label() {
        let g = CrossEntropyLoss::derivative(&[0.5, -1.0, 2.0], 0);
        assert!(g.iter().sum::<f64>().abs() < 1e-12);
        assert!(g[0] < 0.0);
        assert!(g[1] > 0.0 && g[2] > 0.0);
    }
}
