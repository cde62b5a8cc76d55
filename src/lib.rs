pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod prune;
pub mod train;
pub mod error;

// Convenience re-exports
pub use math::{Matrix, Tensor};
pub use activation::ActivationFunction;
pub use layers::{LayerMask, MaskableLayer, MaskedConv2d, MaskedLinear};
pub use network::{Checkpoint, Network, NetworkSpec};
pub use optim::{MultiStepLr, Sgd};
pub use data::{DataSource, DatasetKind, InMemoryDataset};
pub use prune::{ActivationRelevance, PruneTopology, PrunedSet, PruningController, PruningState, RelevanceScorer};
pub use train::{run, RunSummary, TrainConfig, TrainContext};
pub use error::{PruneError, Result};
