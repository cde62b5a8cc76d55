use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::data::DataSource;
use crate::error::{PruneError, Result};
use crate::network::{Checkpoint, Network};
use crate::optim::{MultiStepLr, Sgd};
use crate::prune::{prune_rate, PruneRate, PruneTopology, PruningController, RelevanceScorer, RoundReport};
use crate::train::epoch_stats::EpochStats;
use crate::train::loop_fn::{evaluate, train_epoch, EvalResult};
use crate::train::train_config::TrainConfig;

/// Everything a run touches, threaded explicitly through `run`.
pub struct TrainContext {
    pub config: TrainConfig,
    pub network: Network,
    pub optimizer: Sgd,
    pub lr_schedule: MultiStepLr,
    pub train_data: Box<dyn DataSource>,
    pub test_data: Box<dyn DataSource>,
    pub controller: PruningController,
    pub scorer: Box<dyn RelevanceScorer>,
    /// First epoch `run` will execute; advanced as epochs complete.
    pub start_epoch: usize,
}

impl TrainContext {
    /// Validates `config` and derives the optimizer, schedule and pruning
    /// topology from it.
    pub fn new(
        config: TrainConfig,
        network: Network,
        train_data: Box<dyn DataSource>,
        test_data: Box<dyn DataSource>,
        scorer: Box<dyn RelevanceScorer>,
    ) -> Result<Self> {
        config.validate()?;
        let topology = PruneTopology::from_network(&network, config.frozen_convs)?;
        info!(
            prunable_convs = topology.convs().len(),
            groups = topology.groups().len(),
            prunable_filters = topology.prunable_filters(),
            "pruning topology built"
        );
        check_budget(&config, &topology)?;
        let controller = PruningController::new(topology, config.prune_schedule());
        Ok(TrainContext {
            optimizer: Sgd::with_momentum(config.lr, config.momentum, config.weight_decay),
            lr_schedule: config.lr_schedule(),
            config,
            network,
            train_data,
            test_data,
            controller,
            scorer,
            start_epoch: 0,
        })
    }

    /// Restores parameters and pruning bookkeeping, then rebuilds masks.
    ///
    /// Nothing is modified unless the whole checkpoint is accepted.
    pub fn resume_from(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let mut controller = self.controller.clone();
        controller.restore(checkpoint.pruning.clone())?;
        checkpoint.restore_parameters(&mut self.network)?;
        controller.remask(&mut self.network)?;
        self.controller = controller;
        self.start_epoch = checkpoint.completed_epochs;
        if let Some(saved) = &checkpoint.config {
            if saved != &self.config {
                warn!("resuming with options that differ from the checkpoint's");
            }
        }
        info!(
            epoch = self.start_epoch,
            rounds = checkpoint.pruning.rounds,
            pruned_filters = checkpoint.pruning.pruned_filters(),
            "resumed from checkpoint"
        );
        Ok(())
    }

    /// Resumes from `path` when it exists; returns whether it did.
    pub fn resume_if_present(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            warn!(path = %path.display(), "no checkpoint to resume from, starting fresh");
            return Ok(false);
        }
        let checkpoint = Checkpoint::load_json(path)?;
        self.resume_from(&checkpoint)?;
        Ok(true)
    }

    fn save(&self, completed_epochs: usize) -> Result<()> {
        Checkpoint::capture(&self.network, completed_epochs, self.controller.state())
            .with_config(&self.config)
            .save_json(&self.config.model_dir)
    }
}

/// Fails fast when the scheduled rounds would remove more conv filters or
/// hidden units than the network has.
fn check_budget(config: &TrainConfig, topology: &PruneTopology) -> Result<()> {
    let rounds = config.prune_schedule().rounds_within(config.epochs);
    let filters = rounds * config.x;
    if filters > topology.prunable_filters() {
        return Err(PruneError::Config(format!(
            "{rounds} rounds of x = {} remove {filters} filters, only {} are prunable",
            config.x,
            topology.prunable_filters()
        )));
    }
    let units = rounds * config.linear_units;
    let hidden = topology.hidden().output_width;
    if units > hidden {
        return Err(PruneError::Config(format!(
            "{rounds} rounds of {} linear units remove {units}, hidden layer has {hidden}",
            config.linear_units
        )));
    }
    debug!(rounds, filters, units, "pruning budget fits");
    Ok(())
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub epochs: Vec<EpochStats>,
    pub rounds: Vec<RoundReport>,
    pub final_test: EvalResult,
    pub prune_rate: PruneRate,
}

/// Runs the remaining epochs, pruning on cadence, then evaluates and saves
/// the final model.
///
/// Per epoch: set the learning rate, train, evaluate, prune if due, save a
/// checkpoint. Any error aborts the run; the last checkpoint on disk is the
/// restart point.
pub fn run(ctx: &mut TrainContext) -> Result<RunSummary> {
    let mut epochs = Vec::new();
    let mut rounds = Vec::new();
    let progress = ctx.config.progress;

    for epoch in ctx.start_epoch..ctx.config.epochs {
        let started = Instant::now();
        let lr = ctx.lr_schedule.lr_for_epoch(epoch);
        ctx.optimizer.learning_rate = lr;
        debug!(epoch, lr, "epoch start");

        let train = train_epoch(&mut ctx.network, &mut ctx.optimizer, ctx.train_data.as_mut(), progress)?;
        let test = evaluate(&mut ctx.network, ctx.test_data.as_mut(), progress)?;

        let pruned = ctx.controller.should_prune(epoch);
        if pruned {
            let report = ctx.controller.prune_round(
                epoch,
                &mut ctx.network,
                ctx.train_data.as_mut(),
                ctx.test_data.as_mut(),
                ctx.scorer.as_mut(),
            )?;
            rounds.push(report);
        }

        ctx.save(epoch + 1)?;
        ctx.start_epoch = epoch + 1;

        let stats = EpochStats {
            epoch,
            lr,
            train_loss: train.mean_loss(),
            train_accuracy: train.accuracy(),
            test_loss: test.mean_loss(),
            test_accuracy: test.accuracy(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            pruned,
        };
        info!(
            epoch,
            train_loss = format!("{:.4}", stats.train_loss),
            train_acc = format!("{:.3}%", stats.train_accuracy),
            test_loss = format!("{:.4}", stats.test_loss),
            test_acc = format!("{:.3}%", stats.test_accuracy),
            elapsed_ms = stats.elapsed_ms,
            "epoch complete"
        );
        epochs.push(stats);
    }

    let final_test = evaluate(&mut ctx.network, ctx.test_data.as_mut(), progress)?;
    ctx.save(ctx.config.epochs)?;
    let rate = prune_rate(&ctx.network);
    info!(
        test_acc = format!("{:.3}%", final_test.accuracy()),
        prune_rate = format!("{:.4}", rate.fraction()),
        pruned_filters = ctx.controller.state().pruned_filters(),
        pruned_linear = ctx.controller.state().linear.len(),
        "run complete"
    );
    Ok(RunSummary {
        epochs,
        rounds,
        final_test,
        prune_rate: rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryDataset;
    use crate::math::Tensor;
    use crate::network::{InputShape, NetworkSpec};
    use crate::prune::ActivationRelevance;
    use rand::{rngs::StdRng, SeedableRng};

    fn build(config: TrainConfig) -> Result<TrainContext> {
        let input = InputShape { channels: 1, height: 2, width: 2 };
        let spec = NetworkSpec::from_arch("t", &config.arch, input, 2)?;
        let network = Network::new(spec, &mut StdRng::seed_from_u64(5))?;
        let make = || {
            let inputs = (0..4).map(|i| Tensor::filled(&[1, 2, 2], i as f64 * 0.25)).collect();
            InMemoryDataset::new(inputs, vec![0, 1, 0, 1], 2, 2)
        };
        TrainContext::new(
            config,
            network,
            Box::new(make()?),
            Box::new(make()?),
            Box::new(ActivationRelevance::default()),
        )
    }

    fn small(x: usize, linear_units: usize) -> TrainConfig {
        // One prunable conv of width 4, hidden width 4, rounds at epochs 1, 3, 5.
        TrainConfig {
            arch: "2,4,M".to_string(),
            frozen_convs: 1,
            n: 2,
            n1: 6,
            epochs: 6,
            x,
            linear_units,
            milestones: vec![],
            progress: false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn schedule_that_fits_is_accepted() {
        let ctx = build(small(1, 1)).unwrap();
        assert_eq!(ctx.controller.topology().prunable_filters(), 4);
        assert_eq!(ctx.config.prune_schedule().rounds_within(6), 3);
    }

    #[test]
    fn too_many_filters_is_a_config_error() {
        let err = build(small(2, 1)).err().unwrap();
        assert!(matches!(err, PruneError::Config(_)), "{err}");
    }

    #[test]
    fn too_many_linear_units_is_a_config_error() {
        let err = build(small(1, 2)).err().unwrap();
        assert!(matches!(err, PruneError::Config(_)), "{err}");
    }
}
