use crate::data::DataSource;
use crate::error::{PruneError, Result};
use crate::math::Matrix;
use crate::network::Network;

/// Produces per-unit importance scores for a group of layers.
///
/// Implementations return a `[width × layers.len()]` matrix of non-negative
/// scores, where column `j` belongs to `layers[j]`. Lower means less
/// important. `class_scale[c]` weights the evidence from samples of class `c`.
pub trait RelevanceScorer {
    fn score(
        &mut self,
        network: &mut Network,
        data: &mut dyn DataSource,
        layers: &[String],
        width: usize,
        class_scale: &[f64],
    ) -> Result<Matrix>;
}

/// Class-weighted mean activation magnitude.
///
/// For every sample, each unit contributes its mean absolute post-ReLU
/// output times the scale of the sample's class; the total is averaged over
/// the samples seen.
#[derive(Debug, Clone, Default)]
pub struct ActivationRelevance {
    /// Caps the number of samples per scoring call; `None` scores the whole pass.
    pub sample_limit: Option<usize>,
}

impl ActivationRelevance {
    pub fn new(sample_limit: Option<usize>) -> Self {
        ActivationRelevance { sample_limit }
    }
}

impl RelevanceScorer for ActivationRelevance {
    fn score(
        &mut self,
        network: &mut Network,
        data: &mut dyn DataSource,
        layers: &[String],
        width: usize,
        class_scale: &[f64],
    ) -> Result<Matrix> {
        if class_scale.len() != network.num_classes() {
            return Err(PruneError::ShapeMismatch {
                what: "class scale vector".to_string(),
                expected: vec![network.num_classes()],
                got: vec![class_scale.len()],
            });
        }
        for id in layers {
            let units = network.maskable(id)?.units();
            if units > width {
                return Err(PruneError::ShapeMismatch {
                    what: format!("{id} units vs group width"),
                    expected: vec![width],
                    got: vec![units],
                });
            }
        }

        let limit = self.sample_limit.unwrap_or(usize::MAX);
        let mut totals = Matrix::zeros(width, layers.len());
        let mut seen = 0usize;
        'pass: for batch in data.batches() {
            for (x, &label) in batch.inputs.iter().zip(&batch.labels) {
                if seen >= limit {
                    break 'pass;
                }
                network.forward(x)?;
                let weight = class_scale[label];
                for (j, id) in layers.iter().enumerate() {
                    let acts = network.maskable(id)?.unit_activations();
                    for (u, a) in acts.iter().enumerate() {
                        totals.data[u][j] += weight * a;
                    }
                }
                seen += 1;
            }
        }

        if seen == 0 {
            return Err(PruneError::Dataset("no samples available for relevance scoring".to_string()));
        }
        Ok(totals.map(|v| v / seen as f64))
    }
}
