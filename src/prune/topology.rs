use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{PruneError, Result};
use crate::layers::MaskableLayer;
use crate::network::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Conv,
    Linear,
}

/// Static description of one prunable layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub id: String,
    pub kind: LayerKind,
    pub output_width: usize,
    /// Incoming channels (conv) or features (linear).
    pub input_width: usize,
    /// Upstream prunable layer whose pruned outputs become this layer's
    /// pruned inputs.
    pub predecessor: Option<String>,
    /// Consecutive inputs fed by one upstream unit (the flattened spatial
    /// size for the first linear layer, 1 elsewhere).
    pub input_span: usize,
}

/// A run of consecutive conv layers (in pruning order) sharing one width;
/// scored together in a single relevance call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvGroup {
    pub width: usize,
    pub positions: Range<usize>,
}

/// Prunable layers of a network, ordered back to front.
///
/// `convs[0]` is the last conv of the network; `convs[i + 1]` feeds
/// `convs[i]`. The hidden linear layer consumes `convs[0]` and the head
/// consumes the hidden layer.
#[derive(Debug, Clone)]
pub struct PruneTopology {
    convs: Vec<LayerDescriptor>,
    hidden: LayerDescriptor,
    head: LayerDescriptor,
    groups: Vec<ConvGroup>,
}

impl PruneTopology {
    /// Builds the topology once from the network. The first `frozen_convs`
    /// conv layers are never pruned.
    pub fn from_network(network: &Network, frozen_convs: usize) -> Result<Self> {
        let all = network.conv_layers();
        if frozen_convs >= all.len() {
            return Err(PruneError::Config(format!(
                "frozen_convs = {frozen_convs} leaves no prunable conv layer (network has {})",
                all.len()
            )));
        }

        let prunable: Vec<_> = all[frozen_convs..].iter().rev().collect();
        let convs: Vec<LayerDescriptor> = prunable
            .iter()
            .enumerate()
            .map(|(i, conv)| LayerDescriptor {
                id: conv.name().to_string(),
                kind: LayerKind::Conv,
                output_width: conv.out_channels,
                input_width: conv.in_channels,
                predecessor: prunable.get(i + 1).map(|p| p.name().to_string()),
                input_span: 1,
            })
            .collect();

        for pair in convs.windows(2) {
            if pair[0].input_width != pair[1].output_width {
                return Err(PruneError::Config(format!(
                    "{} expects {} inputs but {} produces {}",
                    pair[0].id, pair[0].input_width, pair[1].id, pair[1].output_width
                )));
            }
        }

        let [fc0, fc1] = match network.classifier.as_slice() {
            [a, b] => [a, b],
            _ => {
                return Err(PruneError::Config(
                    "classifier must have exactly two linear layers".to_string(),
                ))
            }
        };
        let hidden = LayerDescriptor {
            id: fc0.name().to_string(),
            kind: LayerKind::Linear,
            output_width: fc0.size,
            input_width: fc0.input_size,
            predecessor: Some(convs[0].id.clone()),
            input_span: network.flat_spatial(),
        };
        let head = LayerDescriptor {
            id: fc1.name().to_string(),
            kind: LayerKind::Linear,
            output_width: fc1.size,
            input_width: fc1.input_size,
            predecessor: Some(hidden.id.clone()),
            input_span: 1,
        };

        let mut groups: Vec<ConvGroup> = Vec::new();
        for (i, conv) in convs.iter().enumerate() {
            match groups.last_mut() {
                Some(g) if g.width == conv.output_width => g.positions.end = i + 1,
                _ => groups.push(ConvGroup {
                    width: conv.output_width,
                    positions: i..i + 1,
                }),
            }
        }

        Ok(PruneTopology {
            convs,
            hidden,
            head,
            groups,
        })
    }

    pub fn convs(&self) -> &[LayerDescriptor] {
        &self.convs
    }

    pub fn hidden(&self) -> &LayerDescriptor {
        &self.hidden
    }

    pub fn head(&self) -> &LayerDescriptor {
        &self.head
    }

    pub fn groups(&self) -> &[ConvGroup] {
        &self.groups
    }

    pub fn group_ids(&self, group: &ConvGroup) -> Vec<String> {
        self.convs[group.positions.clone()]
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    /// Total number of conv filters the controller may ever remove.
    pub fn prunable_filters(&self) -> usize {
        self.convs.iter().map(|d| d.output_width).sum()
    }
}
