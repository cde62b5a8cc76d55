use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PruneError, Result};
use crate::math::Tensor;
use crate::network::{Network, NetworkSpec};
use crate::prune::PruningState;
use crate::train::TrainConfig;

/// Everything needed to resume a run: parameters, architecture, the
/// cumulative pruned sets and how many epochs are done.
///
/// Masks are not stored; they are rebuilt from `pruning` after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub completed_epochs: usize,
    pub arch: NetworkSpec,
    pub parameters: BTreeMap<String, Tensor>,
    pub pruning: PruningState,
    /// Options of the run that wrote this checkpoint.
    #[serde(default)]
    pub config: Option<TrainConfig>,
}

impl Checkpoint {
    pub fn capture(network: &Network, completed_epochs: usize, pruning: &PruningState) -> Checkpoint {
        Checkpoint {
            completed_epochs,
            arch: network.spec.clone(),
            parameters: network
                .named_parameters()
                .into_iter()
                .map(|(name, t)| (name, t.clone()))
                .collect(),
            pruning: pruning.clone(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: &TrainConfig) -> Checkpoint {
        self.config = Some(config.clone());
        self
    }

    /// Writes the checkpoint as JSON, creating parent directories.
    ///
    /// The file is written next to the target and renamed into place, so a
    /// crash mid-write leaves the previous checkpoint intact.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let file = fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), epoch = self.completed_epochs, "checkpoint saved");
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
        let path = path.as_ref();
        let file = fs::File::open(path)?;
        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PruneError::Checkpoint(format!("{}: {e}", path.display())))?;
        checkpoint.arch.validate()?;
        for set in checkpoint.pruning.conv.iter().chain(std::iter::once(&checkpoint.pruning.linear)) {
            set.validate()?;
        }
        Ok(checkpoint)
    }

    /// Copies the stored parameters into `network`.
    ///
    /// All-or-nothing: the architecture, the parameter names and every shape
    /// are checked before anything is written.
    pub fn restore_parameters(&self, network: &mut Network) -> Result<()> {
        if self.arch != network.spec {
            return Err(PruneError::Checkpoint(format!(
                "checkpoint architecture '{}' does not match network '{}'",
                self.arch.name, network.spec.name
            )));
        }
        let live = network.named_parameters();
        if live.len() != self.parameters.len() {
            return Err(PruneError::Checkpoint(format!(
                "checkpoint has {} parameter tensors, network has {}",
                self.parameters.len(),
                live.len()
            )));
        }
        for (name, tensor) in &live {
            let stored = self
                .parameters
                .get(name)
                .ok_or_else(|| PruneError::Checkpoint(format!("missing parameter {name}")))?;
            if stored.shape() != tensor.shape() || stored.len() != tensor.len() {
                return Err(PruneError::ShapeMismatch {
                    what: name.clone(),
                    expected: tensor.shape().to_vec(),
                    got: stored.shape().to_vec(),
                });
            }
        }

        for (name, tensor) in network.named_parameters_mut() {
            if let Some(stored) = self.parameters.get(&name) {
                tensor.data_mut().copy_from_slice(stored.data());
            }
        }
        Ok(())
    }
}
