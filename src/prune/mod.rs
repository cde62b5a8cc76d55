pub mod class_weight;
pub mod controller;
pub mod global;
pub mod masks;
pub mod pruned_set;
pub mod rate;
pub mod relevance;
pub mod selector;
pub mod topology;

pub use class_weight::{class_scale, confusion_matrix, ClassAccuracy};
pub use controller::{Phase, PickRecord, PruneSchedule, PruningController, PruningState, RoundReport};
pub use global::{select_global, GroupScores, Pick};
pub use masks::build_mask;
pub use pruned_set::PrunedSet;
pub use rate::{prune_rate, LayerRate, PruneRate};
pub use relevance::{ActivationRelevance, RelevanceScorer};
pub use selector::{select_indices, Selection};
pub use topology::{ConvGroup, LayerDescriptor, LayerKind, PruneTopology};
