pub mod checkpoint;
pub mod network;
pub mod spec;

pub use checkpoint::Checkpoint;
pub use network::{Feature, Network};
pub use spec::{FeatureSpec, InputShape, NetworkSpec, VGG16_ARCH};
