use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;

use relprune::network::VGG16_ARCH;
use relprune::{run, ActivationRelevance, DatasetKind, Network, NetworkSpec, TrainConfig, TrainContext};

/// Train a VGG-style CNN while iteratively pruning its least relevant filters.
#[derive(Parser, Debug)]
#[command(name = "relprune", version, about)]
struct Args {
    /// Base learning rate
    #[arg(long, default_value_t = 0.1)]
    lr: f64,

    /// Training batch size
    #[arg(long, default_value_t = 256)]
    batch_size: usize,

    /// Evaluation batch size
    #[arg(long, default_value_t = 64)]
    test_batch_size: usize,

    /// Dataset to train on
    #[arg(long, value_enum, default_value = "cifar10")]
    dataset: DatasetKind,

    /// Directory holding the CIFAR binary files
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Prune after every n-th epoch
    #[arg(short = 'n', long, default_value_t = 21)]
    n: usize,

    /// Conv filters pruned per round
    #[arg(short = 'x', long, default_value_t = 200)]
    x: usize,

    /// Hidden linear units pruned per round
    #[arg(long, default_value_t = 22)]
    linear_units: usize,

    /// Last epoch (exclusive) at which pruning may happen
    #[arg(long = "N1", alias = "n1", default_value_t = 150)]
    n1: usize,

    #[arg(long, default_value_t = 200)]
    epochs: usize,

    /// Checkpoint file
    #[arg(long, default_value = "./saved_models/vgg16_pruned.json")]
    model_dir: PathBuf,

    /// Comma-separated conv widths with M for max-pool
    #[arg(long, default_value = VGG16_ARCH)]
    arch: String,

    /// Leading conv layers that are never pruned
    #[arg(long, default_value_t = 2)]
    frozen_convs: usize,

    #[arg(long, default_value_t = 0.9)]
    momentum: f64,

    #[arg(long, default_value_t = 5e-4)]
    weight_decay: f64,

    /// Epochs at which the learning rate is multiplied by gamma
    #[arg(long, value_delimiter = ',', default_value = "100,150")]
    milestones: Vec<usize>,

    #[arg(long, default_value_t = 0.1)]
    gamma: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Continue from the checkpoint at --model-dir if it exists
    #[arg(long)]
    resume: bool,

    /// Samples per relevance pass (default: the whole train split)
    #[arg(long)]
    score_samples: Option<usize>,

    /// Hide per-batch progress bars
    #[arg(long)]
    no_progress: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<TrainConfig> {
        Ok(TrainConfig {
            lr: self.lr,
            batch_size: self.batch_size,
            test_batch_size: self.test_batch_size,
            dataset: self.dataset,
            data_dir: self.data_dir,
            n: self.n,
            x: self.x,
            linear_units: self.linear_units,
            n1: self.n1,
            epochs: self.epochs,
            model_dir: self.model_dir,
            arch: self.arch,
            frozen_convs: self.frozen_convs,
            momentum: self.momentum,
            weight_decay: self.weight_decay,
            milestones: self.milestones,
            gamma: self.gamma,
            seed: self.seed,
            resume: self.resume,
            score_samples: self.score_samples,
            progress: !self.no_progress,
        })
    }
}

fn setup_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);

    let config = args.into_config()?;
    config.validate()?;
    info!(dataset = ?config.dataset, epochs = config.epochs, n = config.n, x = config.x, n1 = config.n1, "starting run");

    let (train, test) = config
        .dataset
        .open(&config.data_dir, config.batch_size, config.test_batch_size, config.seed)
        .with_context(|| format!("loading {:?} from {}", config.dataset, config.data_dir.display()))?;

    let spec = NetworkSpec::from_arch(
        "vgg",
        &config.arch,
        config.dataset.input_shape(),
        config.dataset.num_classes(),
    )?;
    let network = Network::new(spec, &mut StdRng::seed_from_u64(config.seed))?;

    let scorer = ActivationRelevance::new(config.score_samples);
    let resume = config.resume;
    let model_dir = config.model_dir.clone();
    let mut ctx = TrainContext::new(config, network, Box::new(train), Box::new(test), Box::new(scorer))?;
    if resume {
        ctx.resume_if_present(&model_dir)
            .with_context(|| format!("resuming from {}", model_dir.display()))?;
    }

    let summary = run(&mut ctx).context("training run failed")?;
    println!(
        "Final test accuracy: {:.3}% | prune rate: {:.4} ({} of {} weights) | rounds: {}",
        summary.final_test.accuracy(),
        summary.prune_rate.fraction(),
        summary.prune_rate.zeroed,
        summary.prune_rate.total,
        summary.rounds.len()
    );
    println!("Model saved to {}", model_dir.display());
    Ok(())
}
