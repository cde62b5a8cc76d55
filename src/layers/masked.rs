use crate::error::{PruneError, Result};
use crate::math::tensor::Tensor;

/// Binary keep/drop multipliers for one layer (1 = keep, 0 = pruned).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerMask {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl LayerMask {
    /// The all-ones mask a freshly built layer starts with.
    pub fn keep_all(weight_shape: &[usize], bias_len: Option<usize>) -> LayerMask {
        LayerMask {
            weight: Tensor::ones(weight_shape),
            bias: bias_len.map(|n| Tensor::ones(&[n])),
        }
    }

    /// Checks the mask against a layer's parameter shapes.
    pub fn validate(&self, layer: &str, weight_shape: &[usize], bias_len: usize) -> Result<()> {
        if self.weight.shape() != weight_shape {
            return Err(PruneError::ShapeMismatch {
                what: format!("{layer} weight mask"),
                expected: weight_shape.to_vec(),
                got: self.weight.shape().to_vec(),
            });
        }
        if let Some(bias) = &self.bias {
            if bias.shape() != [bias_len] {
                return Err(PruneError::ShapeMismatch {
                    what: format!("{layer} bias mask"),
                    expected: vec![bias_len],
                    got: bias.shape().to_vec(),
                });
            }
        }
        Ok(())
    }
}

/// Parameter gradients for one layer, shaped like its weight and bias.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub weight: Tensor,
    pub bias: Tensor,
}

impl Gradients {
    pub fn zeros(weight_shape: &[usize], bias_len: usize) -> Gradients {
        Gradients {
            weight: Tensor::zeros(weight_shape),
            bias: Tensor::zeros(&[bias_len]),
        }
    }

    pub fn accumulate(&mut self, other: &Gradients) {
        add_into(&mut self.weight, &other.weight);
        add_into(&mut self.bias, &other.bias);
    }

    pub fn scale(&mut self, factor: f64) {
        self.weight.data_mut().iter_mut().for_each(|v| *v *= factor);
        self.bias.data_mut().iter_mut().for_each(|v| *v *= factor);
    }
}

fn add_into(acc: &mut Tensor, other: &Tensor) {
    for (a, b) in acc.data_mut().iter_mut().zip(other.data()) {
        *a += b;
    }
}

/// Capability shared by every prunable layer: the controller only ever
/// touches layers through this interface, looked up by stable name.
pub trait MaskableLayer {
    fn name(&self) -> &str;

    fn weight_shape(&self) -> &[usize];

    /// Number of output units (filters for a conv, neurons for a linear).
    fn units(&self) -> usize;

    /// Replaces the active mask. The mask is validated in full before it is
    /// swapped in, so a failed call leaves the previous mask in place.
    fn set_mask(&mut self, mask: LayerMask) -> Result<()>;

    fn mask(&self) -> &LayerMask;

    /// Mean absolute post-activation value per output unit, taken from the
    /// most recent forward pass.
    fn unit_activations(&self) -> Vec<f64>;

    fn weight_count(&self) -> usize {
        self.weight_shape().iter().product()
    }

    fn masked_weight_count(&self) -> usize {
        self.mask().weight.count_zeros()
    }
}
