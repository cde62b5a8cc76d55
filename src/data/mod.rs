pub mod cifar;
pub mod dataset;
pub mod kind;
pub mod synthetic;

pub use dataset::{Batch, DataSource, InMemoryDataset};
pub use kind::DatasetKind;
pub use synthetic::SyntheticTask;
