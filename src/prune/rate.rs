use serde::{Deserialize, Serialize};

use crate::layers::MaskableLayer;
use crate::network::Network;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRate {
    pub layer: String,
    pub zeroed: usize,
    pub total: usize,
}

/// Share of weight entries currently zeroed by masks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruneRate {
    pub zeroed: usize,
    pub total: usize,
    pub per_layer: Vec<LayerRate>,
}

impl PruneRate {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.zeroed as f64 / self.total as f64
        }
    }
}

pub fn prune_rate(network: &Network) -> PruneRate {
    let per_layer: Vec<LayerRate> = network
        .maskable_layers()
        .into_iter()
        .map(|l| LayerRate {
            layer: l.name().to_string(),
            zeroed: l.masked_weight_count(),
            total: l.weight_count(),
        })
        .collect();
    PruneRate {
        zeroed: per_layer.iter().map(|l| l.zeroed).sum(),
        total: per_layer.iter().map(|l| l.total).sum(),
        per_layer,
    }
}
