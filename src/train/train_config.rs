use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::data::DatasetKind;
use crate::error::{PruneError, Result};
use crate::network::VGG16_ARCH;
use crate::optim::MultiStepLr;
use crate::prune::PruneSchedule;

/// Every knob of a training-with-pruning run.
///
/// Recorded in each checkpoint so a resumed run can be compared against the
/// options it was started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub lr: f64,
    pub batch_size: usize,
    pub test_batch_size: usize,
    pub dataset: DatasetKind,
    pub data_dir: PathBuf,
    /// Pruning cadence: a round follows epoch `e` when `(e + 1) % n == 0`.
    pub n: usize,
    /// Conv filters pruned per round, picked globally.
    pub x: usize,
    /// Hidden linear units pruned per round.
    pub linear_units: usize,
    /// Pruning stops at this epoch.
    pub n1: usize,
    pub epochs: usize,
    /// Checkpoint file, rewritten after every epoch.
    pub model_dir: PathBuf,
    pub arch: String,
    /// Leading conv layers that are never pruned.
    pub frozen_convs: usize,
    pub momentum: f64,
    pub weight_decay: f64,
    pub milestones: Vec<usize>,
    pub gamma: f64,
    pub seed: u64,
    pub resume: bool,
    /// Caps the samples each relevance pass looks at; `None` uses the whole train split.
    pub score_samples: Option<usize>,
    pub progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            lr: 0.1,
            batch_size: 256,
            test_batch_size: 64,
            dataset: DatasetKind::Cifar10,
            data_dir: PathBuf::from("./data"),
            n: 21,
            x: 200,
            linear_units: 22,
            n1: 150,
            epochs: 200,
            model_dir: PathBuf::from("./saved_models/vgg16_pruned.json"),
            arch: VGG16_ARCH.to_string(),
            frozen_convs: 2,
            momentum: 0.9,
            weight_decay: 5e-4,
            milestones: vec![100, 150],
            gamma: 0.1,
            seed: 0,
            resume: false,
            score_samples: None,
            progress: true,
        }
    }
}

impl TrainConfig {
    /// Rejects values that cannot describe a meaningful run.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(PruneError::Config(msg));
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return fail(format!("learning rate must be positive, got {}", self.lr));
        }
        if self.batch_size == 0 || self.test_batch_size == 0 {
            return fail("batch sizes must be at least 1".to_string());
        }
        if self.n == 0 {
            return fail("pruning cadence n must be at least 1".to_string());
        }
        if self.x == 0 {
            return fail("filters per round x must be at least 1".to_string());
        }
        if self.epochs == 0 {
            return fail("epochs must be at least 1".to_string());
        }
        if self.n1 > self.epochs {
            return fail(format!(
                "pruning end n1 = {} exceeds epochs = {}",
                self.n1, self.epochs
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return fail(format!("momentum must be in [0, 1), got {}", self.momentum));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return fail(format!("weight decay must be non-negative, got {}", self.weight_decay));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return fail(format!("gamma must be in (0, 1], got {}", self.gamma));
        }
        if self.milestones.windows(2).any(|w| w[0] >= w[1]) {
            return fail(format!("milestones must be strictly increasing, got {:?}", self.milestones));
        }
        if self.score_samples == Some(0) {
            return fail("score_samples must be positive when set".to_string());
        }
        Ok(())
    }

    pub fn prune_schedule(&self) -> PruneSchedule {
        PruneSchedule {
            every: self.n,
            until: self.n1,
            filters_per_round: self.x,
            linear_units_per_round: self.linear_units,
        }
    }

    pub fn lr_schedule(&self) -> MultiStepLr {
        MultiStepLr::new(self.lr, self.milestones.clone(), self.gamma)
    }
}
