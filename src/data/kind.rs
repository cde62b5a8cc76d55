use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::data::cifar::{load_cifar, CifarVariant};
use crate::data::dataset::InMemoryDataset;
use crate::data::synthetic::SyntheticTask;
use crate::error::{PruneError, Result};
use crate::network::InputShape;

const SYNTHETIC_CLASSES: usize = 10;
const SYNTHETIC_TRAIN: usize = 512;
const SYNTHETIC_TEST: usize = 128;
const SYNTHETIC_NOISE: f64 = 0.5;

/// Which dataset a run trains on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum DatasetKind {
    Cifar10,
    Cifar100,
    /// Procedurally generated CIFAR-shaped blobs; needs no files.
    Synthetic,
}

impl FromStr for DatasetKind {
    type Err = PruneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cifar10" => Ok(DatasetKind::Cifar10),
            "cifar100" => Ok(DatasetKind::Cifar100),
            "synthetic" => Ok(DatasetKind::Synthetic),
            other => Err(PruneError::Config(format!(
                "unknown dataset '{other}' (expected cifar10, cifar100 or synthetic)"
            ))),
        }
    }
}

impl DatasetKind {
    pub fn num_classes(&self) -> usize {
        match self {
            DatasetKind::Cifar10 => 10,
            DatasetKind::Cifar100 => 100,
            DatasetKind::Synthetic => SYNTHETIC_CLASSES,
        }
    }

    pub fn input_shape(&self) -> InputShape {
        InputShape::CIFAR
    }

    /// Opens the train (shuffled every pass) and test splits.
    pub fn open(
        &self,
        data_dir: &Path,
        batch_size: usize,
        test_batch_size: usize,
        seed: u64,
    ) -> Result<(InMemoryDataset, InMemoryDataset)> {
        let classes = self.num_classes();
        let ((train_x, train_y), (test_x, test_y)) = match self {
            DatasetKind::Cifar10 | DatasetKind::Cifar100 => {
                let variant = if *self == DatasetKind::Cifar10 {
                    CifarVariant::Ten
                } else {
                    CifarVariant::Hundred
                };
                (
                    load_cifar(data_dir, variant, true)?,
                    load_cifar(data_dir, variant, false)?,
                )
            }
            DatasetKind::Synthetic => {
                let task = SyntheticTask::new(classes, self.input_shape(), SYNTHETIC_NOISE, seed);
                (
                    task.sample(SYNTHETIC_TRAIN, seed.wrapping_add(1)),
                    task.sample(SYNTHETIC_TEST, seed.wrapping_add(2)),
                )
            }
        };
        let train = InMemoryDataset::new(train_x, train_y, classes, batch_size)?.shuffled(seed);
        let test = InMemoryDataset::new(test_x, test_y, classes, test_batch_size)?;
        Ok((train, test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataSource;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("CIFAR10".parse::<DatasetKind>().unwrap(), DatasetKind::Cifar10);
        assert_eq!("cifar100".parse::<DatasetKind>().unwrap(), DatasetKind::Cifar100);
        assert!(matches!("mnist".parse::<DatasetKind>(), Err(PruneError::Config(_))));
    }

    #[test]
    fn command_line_names_match_config_names() {
        for kind in DatasetKind::value_variants() {
            let name = kind.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(name.parse::<DatasetKind>().unwrap(), *kind);
            assert_eq!(serde_json::to_string(kind).unwrap(), format!("\"{name}\""));
        }
        assert_eq!(
            <DatasetKind as ValueEnum>::from_str("Cifar100", true).unwrap(),
            DatasetKind::Cifar100
        );
        assert!(<DatasetKind as ValueEnum>::from_str("mnist", true).is_err());
    }

    #[test]
    fn synthetic_opens_without_files() {
        let (train, test) = DatasetKind::Synthetic
            .open(Path::new("/nonexistent"), 64, 32, 3)
            .unwrap();
        assert_eq!(train.len(), SYNTHETIC_TRAIN);
        assert_eq!(test.num_batches(), SYNTHETIC_TEST / 32);
        assert_eq!(train.num_classes(), 10);
    }
}
