use rand::{rngs::StdRng, SeedableRng};

use relprune::data::SyntheticTask;
use relprune::network::InputShape;
use relprune::{
    run, ActivationRelevance, Checkpoint, DatasetKind, InMemoryDataset, MaskableLayer, Network, NetworkSpec, PruneError,
    TrainConfig, TrainContext,
};

const INPUT: InputShape = InputShape {
    channels: 1,
    height: 4,
    width: 4,
};

fn config(dir: &std::path::Path, epochs: usize, n1: usize, arch: &str) -> TrainConfig {
    TrainConfig {
        lr: 0.02,
        batch_size: 4,
        test_batch_size: 4,
        dataset: DatasetKind::Synthetic,
        n: 2,
        x: 2,
        linear_units: 1,
        n1,
        epochs,
        model_dir: dir.join("ckpt").join("model.json"),
        arch: arch.to_string(),
        frozen_convs: 1,
        milestones: vec![],
        progress: false,
        ..TrainConfig::default()
    }
}

fn context(config: TrainConfig, seed: u64) -> TrainContext {
    let task = SyntheticTask::new(2, INPUT, 0.2, 9);
    let (xs, ys) = task.sample(8, 1);
    let train = InMemoryDataset::new(xs, ys, 2, config.batch_size).unwrap();
    let (xs, ys) = task.sample(8, 2);
    let test = InMemoryDataset::new(xs, ys, 2, config.test_batch_size).unwrap();
    let spec = NetworkSpec::from_arch("tiny-vgg", &config.arch, INPUT, 2).unwrap();
    let network = Network::new(spec, &mut StdRng::seed_from_u64(seed)).unwrap();
    TrainContext::new(
        config,
        network,
        Box::new(train),
        Box::new(test),
        Box::new(ActivationRelevance::default()),
    )
    .unwrap()
}

fn masks(ctx: &TrainContext) -> Vec<relprune::LayerMask> {
    ctx.network.maskable_layers().iter().map(|l| l.mask().clone()).collect()
}

#[test]
fn resumed_run_rebuilds_masks_and_matches_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = context(config(dir.path(), 4, 4, "4,6,M,6,M"), 1);
    let summary = run(&mut first).unwrap();
    assert_eq!(summary.rounds.len(), 2);

    let mut second = context(config(dir.path(), 4, 4, "4,6,M,6,M"), 99);
    assert!(second.resume_if_present(&second.config.model_dir.clone()).unwrap());
    assert_eq!(second.start_epoch, 4);
    assert_eq!(second.controller.state(), first.controller.state());
    assert_eq!(masks(&second), masks(&first));
    for ((na, a), (nb, b)) in first.network.named_parameters().iter().zip(second.network.named_parameters()) {
        assert_eq!(na, &nb);
        assert_eq!(a.data(), b.data());
    }

    // Nothing left to train: only the final evaluation runs.
    let again = run(&mut second).unwrap();
    assert!(again.epochs.is_empty());
    assert_eq!(again.final_test, summary.final_test);
}

#[test]
fn resume_continues_pruning_where_it_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = context(config(dir.path(), 4, 4, "4,6,M,6,M"), 1);
    run(&mut first).unwrap();
    assert_eq!(first.controller.state().rounds, 2);

    let mut longer = context(config(dir.path(), 6, 6, "4,6,M,6,M"), 2);
    longer.resume_if_present(&longer.config.model_dir.clone()).unwrap();
    let summary = run(&mut longer).unwrap();
    assert_eq!(summary.epochs.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![4, 5]);
    assert_eq!(summary.rounds.len(), 1);
    assert_eq!(longer.controller.state().rounds, 3);
    assert_eq!(longer.controller.state().pruned_filters(), 6);
}

#[test]
fn foreign_checkpoint_leaves_context_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = context(config(dir.path(), 2, 2, "4,6,M,6,M"), 1);
    run(&mut first).unwrap();
    let checkpoint = Checkpoint::load_json(&first.config.model_dir).unwrap();

    let mut other = context(config(dir.path(), 2, 2, "4,8,M,8,M"), 3);
    let before: Vec<Vec<f64>> = other
        .network
        .named_parameters()
        .iter()
        .map(|(_, t)| t.data().to_vec())
        .collect();
    let err = other.resume_from(&checkpoint).unwrap_err();
    assert!(matches!(err, PruneError::Checkpoint(_)));
    let after: Vec<Vec<f64>> = other
        .network
        .named_parameters()
        .iter()
        .map(|(_, t)| t.data().to_vec())
        .collect();
    assert_eq!(before, after);
    assert_eq!(other.start_epoch, 0);
    assert_eq!(other.controller.state().pruned_filters(), 0);
}

#[test]
fn missing_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(config(dir.path(), 2, 2, "4,6,M,6,M"), 1);
    assert!(!ctx.resume_if_present(&dir.path().join("absent.json")).unwrap());
    assert_eq!(ctx.start_epoch, 0);
}
