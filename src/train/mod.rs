pub mod epoch_stats;
pub mod loop_fn;
pub mod progress;
pub mod runner;
pub mod train_config;

pub use epoch_stats::EpochStats;
pub use loop_fn::{evaluate, train_epoch, EvalResult};
pub use progress::BatchProgress;
pub use runner::{run, RunSummary, TrainContext};
pub use train_config::TrainConfig;
