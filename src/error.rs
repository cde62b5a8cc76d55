use thiserror::Error;

/// Errors raised by the pruning library.
///
/// Every variant is fatal for a training run: there is no degraded mode, so
/// callers propagate these up to the process boundary.
#[derive(Debug, Error)]
pub enum PruneError {
    /// Invalid option value or dataset name, detected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A mask, parameter or input does not have the shape its consumer expects.
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// An index was inserted twice into a pruned-index set.
    #[error("index {index} is already pruned in {layer}")]
    DuplicateIndex { layer: String, index: usize },

    /// An index falls outside the width of the layer it refers to.
    #[error("index {index} out of range for {layer} (width {width})")]
    IndexOutOfRange {
        layer: String,
        index: usize,
        width: usize,
    },

    /// More indices were requested than unpruned candidates remain.
    #[error("cannot select {requested} units from {scope}: only {available} remain unpruned")]
    Capacity {
        scope: String,
        requested: usize,
        available: usize,
    },

    /// Pruning bookkeeping disagrees with itself (e.g. a set grew by a
    /// different amount than the picks that landed in it).
    #[error("pruning invariant violated: {0}")]
    Invariant(String),

    /// A layer id that the network does not contain.
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),

    /// NaN or infinite values where finite scores are required.
    #[error("numerical instability in {0}")]
    NumericalInstability(String),

    /// Corrupt, incomplete or incompatible checkpoint.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Malformed or missing dataset files.
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PruneError>;
