use rand::{rngs::StdRng, SeedableRng};

use relprune::data::SyntheticTask;
use relprune::network::InputShape;
use relprune::prune::PruneSchedule;
use relprune::{
    run, ActivationRelevance, Checkpoint, DatasetKind, InMemoryDataset, MaskableLayer, Network, NetworkSpec,
    TrainConfig, TrainContext,
};

const INPUT: InputShape = InputShape {
    channels: 2,
    height: 4,
    width: 4,
};

fn context(dir: &std::path::Path, seed: u64) -> TrainContext {
    let config = TrainConfig {
        lr: 0.02,
        batch_size: 8,
        test_batch_size: 8,
        dataset: DatasetKind::Synthetic,
        n: 2,
        x: 3,
        linear_units: 1,
        n1: 5,
        epochs: 6,
        model_dir: dir.join("model.json"),
        arch: "4,4,M,8,8,M".to_string(),
        frozen_convs: 1,
        milestones: vec![4],
        seed,
        progress: false,
        ..TrainConfig::default()
    };
    let task = SyntheticTask::new(2, INPUT, 0.3, 7);
    let (xs, ys) = task.sample(16, 1);
    let train = InMemoryDataset::new(xs, ys, 2, config.batch_size).unwrap().shuffled(3);
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

fn output_row_zeroed(net: &Network, layer: &str, unit: usize) -> bool {
    let mask = &net.maskable(layer).unwrap().mask().weight;
    let row = mask.row_len();
    mask.data()[unit * row..(unit + 1) * row].iter().all(|v| *v == 0.0)
}

fn input_channel_zeroed(net: &Network, layer: &str, channel: usize, span: usize) -> bool {
    let mask = &net.maskable(layer).unwrap().mask().weight;
    mask.data()
        .chunks(mask.row_len())
        .all(|r| r[channel * span..(channel + 1) * span].iter().all(|v| *v == 0.0))
}

#[test]
fn default_cadence_prunes_before_n1_only() {
    let schedule = TrainConfig::default().prune_schedule();
    let rounds: Vec<usize> = (0..200).filter(|e| schedule.is_round(*e)).collect();
    assert_eq!(rounds, vec![20, 41, 62, 83, 104, 125, 146]);

    let tight = PruneSchedule { until: 146, ..schedule };
    assert!(!tight.is_round(146));
}

#[test]
fn run_prunes_on_cadence_and_keeps_masks_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path(), 11);
    let summary = run(&mut ctx).unwrap();

    assert_eq!(summary.epochs.len(), 6);
    let pruned_epochs: Vec<usize> = summary.epochs.iter().filter(|s| s.pruned).map(|s| s.epoch).collect();
    assert_eq!(pruned_epochs, vec![1, 3]);
    assert_eq!(summary.rounds.len(), 2);
    assert!((summary.epochs[5].lr - 0.002).abs() < 1e-12);

    for report in &summary.rounds {
        assert_eq!(report.picks.len(), 3);
        assert!(report.picks.windows(2).all(|w| w[0].score <= w[1].score));
        assert_eq!(report.per_layer.iter().map(|(_, n)| n).sum::<usize>(), 3);
        assert_eq!(report.linear_picked.len(), 1);
    }

    let state = ctx.controller.state().clone();
    assert_eq!(state.rounds, 2);
    assert_eq!(state.pruned_filters(), 6);
    assert_eq!(state.linear.len(), 2);

    // Every pruned output is masked, and feeds masked inputs downstream.
    let topo = ctx.controller.topology();
    for (i, desc) in topo.convs().iter().enumerate() {
        for unit in state.conv[i].iter() {
            assert!(output_row_zeroed(&ctx.network, &desc.id, unit));
        }
        if let Some(upstream) = state.conv.get(i + 1) {
            for ch in upstream.iter() {
                assert!(input_channel_zeroed(&ctx.network, &desc.id, ch, 9));
            }
        }
    }
    for ch in state.conv[0].iter() {
        assert!(input_channel_zeroed(&ctx.network, "fc0", ch, 1));
    }
    for unit in state.linear.iter() {
        assert!(output_row_zeroed(&ctx.network, "fc0", unit));
        assert!(input_channel_zeroed(&ctx.network, "fc1", unit, 1));
    }
    for layer in ctx.network.maskable_layers() {
        assert_eq!(layer.mask().weight.shape(), layer.weight_shape());
    }
    assert!(summary.prune_rate.fraction() > 0.0);

    // Re-masking with unchanged sets is a no-op.
    let before: Vec<_> = ctx.network.maskable_layers().iter().map(|l| l.mask().clone()).collect();
    ctx.controller.remask(&mut ctx.network).unwrap();
    let after: Vec<_> = ctx.network.maskable_layers().iter().map(|l| l.mask().clone()).collect();
    assert_eq!(before, after);

    let saved = Checkpoint::load_json(dir.path().join("model.json")).unwrap();
    assert_eq!(saved.completed_epochs, 6);
    assert_eq!(saved.pruning, state);
    assert_eq!(saved.config.as_ref(), Some(&ctx.config));
}

#[test]
fn pruned_sets_only_grow_between_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = context(dir.path(), 5);
    let mut snapshots = vec![ctx.controller.state().clone()];
    for epoch in 0..6 {
        if ctx.controller.should_prune(epoch) {
            ctx.controller
                .prune_round(
                    epoch,
                    &mut ctx.network,
                    ctx.train_data.as_mut(),
                    ctx.test_data.as_mut(),
                    ctx.scorer.as_mut(),
                )
                .unwrap();
            snapshots.push(ctx.controller.state().clone());
        }
    }
    assert_eq!(snapshots.len(), 3);
    for pair in snapshots.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert_eq!(b.pruned_filters(), a.pruned_filters() + 3);
        for (sa, sb) in a.conv.iter().zip(&b.conv) {
            assert!(sa.iter().all(|i| sb.contains(i)));
        }
        assert!(a.linear.iter().all(|i| b.linear.contains(i)));
    }
}
