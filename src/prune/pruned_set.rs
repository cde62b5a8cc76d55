use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PruneError, Result};

/// Cumulative set of pruned unit indices for one layer.
///
/// Grows monotonically across pruning rounds; inserting a duplicate or an
/// index beyond the layer width is an error, never a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrunedSet {
    layer: String,
    width: usize,
    indices: BTreeSet<usize>,
}

impl PrunedSet {
    pub fn new(layer: &str, width: usize) -> Self {
        PrunedSet {
            layer: layer.to_string(),
            width,
            indices: BTreeSet::new(),
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn insert(&mut self, index: usize) -> Result<()> {
        if index >= self.width {
            return Err(PruneError::IndexOutOfRange {
                layer: self.layer.clone(),
                index,
                width: self.width,
            });
        }
        if !self.indices.insert(index) {
            return Err(PruneError::DuplicateIndex {
                layer: self.layer.clone(),
                index,
            });
        }
        Ok(())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Units still alive in this layer.
    pub fn remaining(&self) -> usize {
        self.width - self.indices.len()
    }

    /// Pruned indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Re-checks the invariants after deserialization.
    pub fn validate(&self) -> Result<()> {
        match self.indices.iter().next_back() {
            Some(&max) if max >= self.width => Err(PruneError::IndexOutOfRange {
                layer: self.layer.clone(),
                index: max,
                width: self.width,
            }),
            _ => Ok(()),
        }
    }
}
