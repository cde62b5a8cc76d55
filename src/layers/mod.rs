pub mod conv;
pub mod linear;
pub mod masked;
pub mod pool;

pub use conv::MaskedConv2d;
pub use linear::MaskedLinear;
pub use masked::{Gradients, LayerMask, MaskableLayer};
pub use pool::MaxPool2;
