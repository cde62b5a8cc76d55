/// Step decay: the rate is multiplied by `gamma` once for every milestone
/// epoch that has been reached.
#[derive(Debug, Clone)]
pub struct MultiStepLr {
    pub base_lr: f64,
    pub milestones: Vec<usize>,
    pub gamma: f64,
}

impl MultiStepLr {
    pub fn new(base_lr: f64, milestones: Vec<usize>, gamma: f64) -> Self {
        MultiStepLr {
            base_lr,
            milestones,
            gamma,
        }
    }

    /// Learning rate in effect during `epoch` (0-based). Computed from
    /// scratch so a resumed run lands on the same value.
    pub fn lr_for_epoch(&self, epoch: usize) -> f64 {
        let passed = self.milestones.iter().filter(|m| **m <= epoch).count();
        self.base_lr * self.gamma.powi(passed as i32)
    }
}
