use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{PruneError, Result};
use crate::math::Tensor;

/// One mini-batch borrowed from a data source.
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    pub inputs: Vec<&'a Tensor>,
    pub labels: Vec<usize>,
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A finite, restartable sequence of labelled mini-batches.
///
/// Each call to `batches` starts a fresh pass that ends after exactly
/// `num_batches()` batches.
pub trait DataSource {
    fn len(&self) -> usize;

    fn num_classes(&self) -> usize;

    fn batch_size(&self) -> usize;

    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch<'_>> + '_>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size())
    }
}

/// Samples held in memory, optionally reshuffled on every pass.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    inputs: Vec<Tensor>,
    labels: Vec<usize>,
    num_classes: usize,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl InMemoryDataset {
    pub fn new(
        inputs: Vec<Tensor>,
        labels: Vec<usize>,
        num_classes: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if inputs.len() != labels.len() {
            return Err(PruneError::Dataset(format!(
                "{} inputs but {} labels",
                inputs.len(),
                labels.len()
            )));
        }
        if batch_size == 0 {
            return Err(PruneError::Config("batch size must be at least 1".to_string()));
        }
        if let Some(bad) = labels.iter().find(|l| **l >= num_classes) {
            return Err(PruneError::Dataset(format!(
                "label {bad} out of range for {num_classes} classes"
            )));
        }
        if let Some(first) = inputs.first() {
            if let Some(odd) = inputs.iter().find(|t| t.shape() != first.shape()) {
                return Err(PruneError::ShapeMismatch {
                    what: "dataset sample".to_string(),
                    expected: first.shape().to_vec(),
                    got: odd.shape().to_vec(),
                });
            }
        }
        Ok(InMemoryDataset {
            inputs,
            labels,
            num_classes,
            batch_size,
            shuffle: false,
            rng: StdRng::seed_from_u64(0),
        })
    }

    /// Reshuffles sample order at the start of every pass.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl DataSource for InMemoryDataset {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch<'_>> + '_> {
        let mut order: Vec<usize> = (0..self.inputs.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        let inputs = &self.inputs;
        let labels = &self.labels;
        let batch_size = self.batch_size;
        Box::new((0..order.len()).step_by(batch_size).map(move |start| {
            let idx = &order[start..(start + batch_size).min(order.len())];
            Batch {
                inputs: idx.iter().map(|&i| &inputs[i]).collect(),
                labels: idx.iter().map(|&i| labels[i]).collect(),
            }
        }))
    }
}
