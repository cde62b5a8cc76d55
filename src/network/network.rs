use rand::Rng;

use crate::activation::ActivationFunction;
use crate::error::{PruneError, Result};
use crate::layers::{Gradients, MaskableLayer, MaskedConv2d, MaskedLinear, MaxPool2};
use crate::math::tensor::Tensor;
use crate::network::spec::{FeatureSpec, NetworkSpec};
use crate::optim::Sgd;

/// One stage of the feature extractor.
#[derive(Debug, Clone)]
pub enum Feature {
    Conv(MaskedConv2d),
    Pool(MaxPool2),
}

/// VGG-style classifier: conv/pool feature stack, flatten, two linear layers.
///
/// Conv layers are named `conv0..` in declaration order, the classifier
/// layers `fc0` (hidden, ReLU) and `fc1` (logits). Parameters are named
/// `<layer>.weight` / `<layer>.bias`.
#[derive(Debug, Clone)]
pub struct Network {
    pub spec: NetworkSpec,
    pub features: Vec<Feature>,
    pub classifier: Vec<MaskedLinear>,
    flat_shape: [usize; 3],
}

impl Network {
    pub fn new<R: Rng>(spec: NetworkSpec, rng: &mut R) -> Result<Network> {
        spec.validate()?;
        let mut channels = spec.input.channels;
        let mut conv_index = 0;
        let features = spec
            .features
            .iter()
            .map(|f| match f {
                FeatureSpec::Conv { width } => {
                    let conv = MaskedConv2d::new(&format!("conv{conv_index}"), channels, *width, rng);
                    channels = *width;
                    conv_index += 1;
                    Feature::Conv(conv)
                }
                FeatureSpec::Pool => Feature::Pool(MaxPool2::new()),
            })
            .collect();

        let flat_shape = spec.feature_output()?;
        let flat: usize = flat_shape.iter().product();
        let hidden = spec.hidden_width();
        let classifier = vec![
            MaskedLinear::new("fc0", hidden, flat, ActivationFunction::ReLU, rng),
            MaskedLinear::new("fc1", spec.num_classes, hidden, ActivationFunction::Identity, rng),
        ];

        Ok(Network {
            spec,
            features,
            classifier,
            flat_shape,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.spec.num_classes
    }

    /// Spatial positions per channel at the flatten boundary; each channel of
    /// the last conv feeds this many consecutive `fc0` inputs.
    pub fn flat_spatial(&self) -> usize {
        self.flat_shape[1] * self.flat_shape[2]
    }

    /// Forward pass for one sample; returns the logits and caches
    /// activations in every layer for backprop and relevance scoring.
    pub fn forward(&mut self, input: &Tensor) -> Result<Vec<f64>> {
        if input.shape() != self.spec.input.dims() {
            return Err(PruneError::ShapeMismatch {
                what: "network input".to_string(),
                expected: self.spec.input.dims().to_vec(),
                got: input.shape().to_vec(),
            });
        }
        let mut current = input.clone();
        for feature in &mut self.features {
            current = match feature {
                Feature::Conv(conv) => conv.forward(&current)?,
                Feature::Pool(pool) => pool.forward(&current)?,
            };
        }
        let mut activ = current.data().to_vec();
        for layer in &mut self.classifier {
            activ = layer.feed_from(&activ)?;
        }
        Ok(activ)
    }

    /// Backward pass for the most recent `forward` call.
    ///
    /// Returns one `Gradients` per parameterized layer, in the order of
    /// `layer_names()`.
    pub fn backward(&self, grad_logits: &[f64]) -> Result<Vec<Gradients>> {
        let mut linear_grads = Vec::with_capacity(self.classifier.len());
        let mut delta = grad_logits.to_vec();
        for layer in self.classifier.iter().rev() {
            let (grad_in, grads) = layer.compute_gradients(&delta);
            linear_grads.push(grads);
            delta = grad_in;
        }
        linear_grads.reverse();

        let mut grad = Tensor::from_vec(&self.flat_shape, delta)?;
        let mut conv_grads = Vec::new();
        for feature in self.features.iter().rev() {
            grad = match feature {
                Feature::Conv(conv) => {
                    let (grad_in, grads) = conv.backward(&grad);
                    conv_grads.push(grads);
                    grad_in
                }
                Feature::Pool(pool) => pool.backward(&grad),
            };
        }
        conv_grads.reverse();
        conv_grads.extend(linear_grads);
        Ok(conv_grads)
    }

    /// Zeroed accumulators, one per parameterized layer.
    pub fn zero_gradients(&self) -> Vec<Gradients> {
        self.maskable_layers()
            .into_iter()
            .map(|l| Gradients::zeros(l.weight_shape(), l.units()))
            .collect()
    }

    pub fn apply_gradients(&mut self, grads: &[Gradients], optimizer: &mut Sgd) {
        let convs = self.features.iter_mut().filter_map(|f| match f {
            Feature::Conv(c) => Some(c),
            Feature::Pool(_) => None,
        });
        let mut grads = grads.iter();
        for conv in convs {
            if let Some(g) = grads.next() {
                let name = conv.name().to_string();
                optimizer.step(&format!("{name}.weight"), &mut conv.weights, &g.weight);
                optimizer.step(&format!("{name}.bias"), &mut conv.bias, &g.bias);
            }
        }
        for layer in &mut self.classifier {
            if let Some(g) = grads.next() {
                let name = layer.name().to_string();
                optimizer.step(&format!("{name}.weight"), &mut layer.weights, &g.weight);
                optimizer.step(&format!("{name}.bias"), &mut layer.biases, &g.bias);
            }
        }
    }

    pub fn conv_layers(&self) -> Vec<&MaskedConv2d> {
        self.features
            .iter()
            .filter_map(|f| match f {
                Feature::Conv(c) => Some(c),
                Feature::Pool(_) => None,
            })
            .collect()
    }

    /// Every prunable layer in declaration order (convs, then classifier).
    pub fn maskable_layers(&self) -> Vec<&dyn MaskableLayer> {
        let mut layers: Vec<&dyn MaskableLayer> = Vec::new();
        for f in &self.features {
            if let Feature::Conv(c) = f {
                layers.push(c);
            }
        }
        for l in &self.classifier {
            layers.push(l);
        }
        layers
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.maskable_layers()
            .iter()
            .map(|l| l.name().to_string())
            .collect()
    }

    pub fn maskable(&self, name: &str) -> Result<&dyn MaskableLayer> {
        self.maskable_layers()
            .into_iter()
            .find(|l| l.name() == name)
            .ok_or_else(|| PruneError::UnknownLayer(name.to_string()))
    }

    pub fn maskable_mut(&mut self, name: &str) -> Result<&mut dyn MaskableLayer> {
        for f in &mut self.features {
            if let Feature::Conv(c) = f {
                if c.name() == name {
                    return Ok(c);
                }
            }
        }
        for l in &mut self.classifier {
            if l.name() == name {
                return Ok(l);
            }
        }
        Err(PruneError::UnknownLayer(name.to_string()))
    }

    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = Vec::new();
        for c in self.conv_layers() {
            params.push((format!("{}.weight", c.name()), &c.weights));
            params.push((format!("{}.bias", c.name()), &c.bias));
        }
        for l in &self.classifier {
            params.push((format!("{}.weight", l.name()), &l.weights));
            params.push((format!("{}.bias", l.name()), &l.biases));
        }
        params
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = Vec::new();
        for f in &mut self.features {
            if let Feature::Conv(c) = f {
                let name = c.name().to_string();
                params.push((format!("{name}.weight"), &mut c.weights));
                params.push((format!("{name}.bias"), &mut c.bias));
            }
        }
        for l in &mut self.classifier {
            let name = l.name().to_string();
            params.push((format!("{name}.weight"), &mut l.weights));
            params.push((format!("{name}.bias"), &mut l.biases));
        }
        params
    }
}
