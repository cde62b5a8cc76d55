use tracing::debug;

use crate::activation::{argmax, ActivationFunction};
use crate::data::DataSource;
use crate::error::{PruneError, Result};
use crate::math::Matrix;
use crate::network::Network;

/// Confusion matrix (`[true × predicted]` counts) and per-class accuracy.
#[derive(Debug, Clone)]
pub struct ClassAccuracy {
    pub confusion: Matrix,
    /// Recall per class. A class with no samples counts as fully accurate.
    pub accuracy: Vec<f64>,
}

/// Runs the network over every sample of `data` and tallies predictions.
pub fn confusion_matrix<D: DataSource + ?Sized>(network: &mut Network, data: &mut D) -> Result<ClassAccuracy> {
    let classes = network.num_classes();
    if data.num_classes() != classes {
        return Err(PruneError::ShapeMismatch {
            what: "dataset class count".to_string(),
            expected: vec![classes],
            got: vec![data.num_classes()],
        });
    }
    let mut confusion = Matrix::zeros(classes, classes);
    for batch in data.batches() {
        for (x, &label) in batch.inputs.iter().zip(&batch.labels) {
            let logits = network.forward(x)?;
            confusion.data[label][argmax(&logits)] += 1.0;
        }
    }
    let accuracy: Vec<f64> = (0..classes)
        .map(|c| {
            let total = confusion.row_sum(c);
            if total == 0.0 {
                1.0
            } else {
                confusion.get(c, c) / total
            }
        })
        .collect();
    debug!(?accuracy, "per-class accuracy");
    Ok(ClassAccuracy { confusion, accuracy })
}

/// Turns per-class accuracy into a class-emphasis scale.
///
/// Accuracy is normalized by its maximum, inverted and squashed through the
/// sigmoid, so the hardest classes approach 1.0 and the easiest sit at
/// sigmoid(1) ≈ 0.73. A class with zero accuracy maps to exactly 1.0.
pub fn class_scale(accuracy: &[f64]) -> Vec<f64> {
    let max = accuracy.iter().cloned().fold(0.0, f64::max);
    let sigmoid = ActivationFunction::Sigmoid;
    if max <= 0.0 {
        return vec![sigmoid.function(1.0); accuracy.len()];
    }
    accuracy
        .iter()
        .map(|a| {
            let normalized = a / max;
            let inverted = if normalized > 0.0 { 1.0 / normalized } else { f64::INFINITY };
            sigmoid.function(inverted)
        })
        .collect()
}
