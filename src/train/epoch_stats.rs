use serde::{Deserialize, Serialize};

/// Summary of one epoch, logged at its end and collected by `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 0-based epoch index.
    pub epoch: usize,
    /// Learning rate used for this epoch.
    pub lr: f64,
    /// Mean cross-entropy over training samples.
    pub train_loss: f64,
    /// Percent of training samples classified correctly.
    pub train_accuracy: f64,
    pub test_loss: f64,
    pub test_accuracy: f64,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
    /// Whether a pruning round ran after this epoch.
    pub pruned: bool,
}
