use std::path::Path;

use tracing::info;

use crate::error::{PruneError, Result};
use crate::math::Tensor;

/// Per-channel normalization constants used for both CIFAR variants.
pub const CIFAR_MEAN: [f64; 3] = [0.4914, 0.4822, 0.4465];
pub const CIFAR_STD: [f64; 3] = [0.2023, 0.1994, 0.2010];

const PIXELS: usize = 32 * 32;
const IMAGE_BYTES: usize = 3 * PIXELS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarVariant {
    /// Records are `label, 3072 pixels`.
    Ten,
    /// Records are `coarse label, fine label, 3072 pixels`; the fine label is used.
    Hundred,
}

impl CifarVariant {
    pub fn num_classes(&self) -> usize {
        match self {
            CifarVariant::Ten => 10,
            CifarVariant::Hundred => 100,
        }
    }

    fn label_bytes(&self) -> usize {
        match self {
            CifarVariant::Ten => 1,
            CifarVariant::Hundred => 2,
        }
    }

    fn files(&self, train: bool) -> Vec<String> {
        match (self, train) {
            (CifarVariant::Ten, true) => (1..=5)
                .map(|i| format!("cifar-10-batches-bin/data_batch_{i}.bin"))
                .collect(),
            (CifarVariant::Ten, false) => vec!["cifar-10-batches-bin/test_batch.bin".to_string()],
            (CifarVariant::Hundred, true) => vec!["cifar-100-binary/train.bin".to_string()],
            (CifarVariant::Hundred, false) => vec!["cifar-100-binary/test.bin".to_string()],
        }
    }
}

/// Parses the CIFAR binary record format into normalized `[3, 32, 32]` tensors.
pub fn parse_cifar_records(bytes: &[u8], variant: CifarVariant) -> Result<(Vec<Tensor>, Vec<usize>)> {
    let record = variant.label_bytes() + IMAGE_BYTES;
    if bytes.len() % record != 0 {
        return Err(PruneError::Dataset(format!(
            "CIFAR file length {} is not a multiple of the {record}-byte record size",
            bytes.len()
        )));
    }

    let mut inputs = Vec::with_capacity(bytes.len() / record);
    let mut labels = Vec::with_capacity(bytes.len() / record);
    for rec in bytes.chunks_exact(record) {
        let label = rec[variant.label_bytes() - 1] as usize;
        if label >= variant.num_classes() {
            return Err(PruneError::Dataset(format!(
                "CIFAR label {label} out of range for {} classes",
                variant.num_classes()
            )));
        }
        let pixels = &rec[variant.label_bytes()..];
        let data = pixels
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let c = i / PIXELS;
                (*p as f64 / 255.0 - CIFAR_MEAN[c]) / CIFAR_STD[c]
            })
            .collect();
        inputs.push(Tensor::from_vec(&[3, 32, 32], data)?);
        labels.push(label);
    }
    Ok((inputs, labels))
}

/// Loads the train or test split from the standard binary distribution
/// unpacked under `dir`.
pub fn load_cifar(dir: &Path, variant: CifarVariant, train: bool) -> Result<(Vec<Tensor>, Vec<usize>)> {
    let mut inputs = Vec::new();
    let mut labels = Vec::new();
    for file in variant.files(train) {
        let path = dir.join(&file);
        let bytes = std::fs::read(&path).map_err(|e| {
            PruneError::Dataset(format!("cannot read {}: {e}", path.display()))
        })?;
        let (mut x, mut y) = parse_cifar_records(&bytes, variant)?;
        inputs.append(&mut x);
        labels.append(&mut y);
    }
    info!(
        split = if train { "train" } else { "test" },
        samples = inputs.len(),
        classes = variant.num_classes(),
        "loaded CIFAR split"
    );
    Ok((inputs, labels))
}
