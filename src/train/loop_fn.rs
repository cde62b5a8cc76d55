use crate::activation::argmax;
use crate::data::DataSource;
use crate::error::{PruneError, Result};
use crate::loss::CrossEntropyLoss;
use crate::network::Network;
use crate::optim::Sgd;
use crate::train::progress::BatchProgress;

/// Running totals over one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvalResult {
    /// Sum of per-sample losses.
    pub loss: f64,
    pub correct: usize,
    pub total: usize,
}

impl EvalResult {
    pub fn mean_loss(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.loss / self.total as f64
        }
    }

    /// Accuracy in percent.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.correct as f64 / self.total as f64
        }
    }

    fn record(&mut self, logits: &[f64], label: usize) -> Result<()> {
        let loss = CrossEntropyLoss::loss(logits, label);
        if !loss.is_finite() {
            return Err(PruneError::NumericalInstability(format!(
                "cross-entropy loss {loss} for label {label}"
            )));
        }
        self.loss += loss;
        self.total += 1;
        if argmax(logits) == label {
            self.correct += 1;
        }
        Ok(())
    }
}

// ─── Training ────────────────────────────────────────────────────────────────

/// One pass of mini-batch SGD over `data`.
///
/// Per-sample gradients are summed over the batch, averaged, and applied
/// once per batch through `optimizer`. Masked parameters receive zero
/// gradient, so pruned weights stay pruned.
///
/// # Arguments
/// - `network`: updated in place
/// - `optimizer`: carries the learning rate for this epoch
/// - `data`: training source; shuffling is the source's business
/// - `progress`: show a per-batch progress bar
pub fn train_epoch<D: DataSource + ?Sized>(
    network: &mut Network,
    optimizer: &mut Sgd,
    data: &mut D,
    progress: bool,
) -> Result<EvalResult> {
    let bar = BatchProgress::new(data.num_batches(), "train", progress);
    let mut totals = EvalResult::default();

    for batch in data.batches() {
        if batch.is_empty() {
            continue;
        }
        let mut acc = network.zero_gradients();
        for (x, &label) in batch.inputs.iter().zip(&batch.labels) {
            let logits = network.forward(x)?;
            totals.record(&logits, label)?;
            let grads = network.backward(&CrossEntropyLoss::derivative(&logits, label))?;
            for (a, g) in acc.iter_mut().zip(&grads) {
                a.accumulate(g);
            }
        }
        let inv = 1.0 / batch.len() as f64;
        for a in &mut acc {
            a.scale(inv);
        }
        network.apply_gradients(&acc, optimizer);
        bar.advance(totals.mean_loss(), totals.accuracy());
    }
    bar.finish();
    Ok(totals)
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Loss and accuracy over every sample of `data`; parameters are untouched.
pub fn evaluate<D: DataSource + ?Sized>(network: &mut Network, data: &mut D, progress: bool) -> Result<EvalResult> {
    let bar = BatchProgress::new(data.num_batches(), "test", progress);
    let mut totals = EvalResult::default();
    for batch in data.batches() {
        for (x, &label) in batch.inputs.iter().zip(&batch.labels) {
            let logits = network.forward(x)?;
            totals.record(&logits, label)?;
        }
        bar.advance(totals.mean_loss(), totals.accuracy());
    }
    bar.finish();
    Ok(totals)
}
