use serde::{Deserialize, Serialize};

use crate::error::{PruneError, Result};

/// Conv widths and pooling stages of the standard 16-layer VGG feature stack.
pub const VGG16_ARCH: &str = "64,64,M,128,128,M,256,256,256,M,512,512,512,M,512,512,512,M";

/// One stage of the feature extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureSpec {
    /// 3×3 same-padding convolution + ReLU producing `width` channels.
    Conv { width: usize },
    /// 2×2 max-pool.
    Pool,
}

/// Shape of one input sample, channels first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl InputShape {
    pub const CIFAR: InputShape = InputShape {
        channels: 3,
        height: 32,
        width: 32,
    };

    pub fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

/// A fully serializable description of a VGG-style classifier.
///
/// The feature stack is followed by `Linear(flat, hidden) → ReLU →
/// Linear(hidden, num_classes)`; `hidden` defaults to the last conv width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name, recorded in checkpoints.
    pub name: String,
    pub input: InputShape,
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub hidden: Option<usize>,
    pub num_classes: usize,
}

impl NetworkSpec {
    /// Parses a comma-separated architecture string such as `"64,M,128,M"`
    /// (numbers are conv widths, `M` is a max-pool).
    pub fn from_arch(name: &str, arch: &str, input: InputShape, num_classes: usize) -> Result<Self> {
        let features = arch
            .split(',')
            .map(str::trim)
            .filter(|tok| !tok.is_empty())
            .map(|tok| match tok {
                "M" | "m" => Ok(FeatureSpec::Pool),
                n => n
                    .parse::<usize>()
                    .ok()
                    .filter(|w| *w > 0)
                    .map(|width| FeatureSpec::Conv { width })
                    .ok_or_else(|| PruneError::Config(format!("bad architecture token '{n}'"))),
            })
            .collect::<Result<Vec<_>>>()?;
        let spec = NetworkSpec {
            name: name.to_string(),
            input,
            features,
            hidden: None,
            num_classes,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn vgg16(num_classes: usize) -> Self {
        NetworkSpec {
            name: "vgg16".to_string(),
            input: InputShape::CIFAR,
            features: VGG16_ARCH
                .split(',')
                .map(|tok| match tok.parse::<usize>() {
                    Ok(width) => FeatureSpec::Conv { width },
                    Err(_) => FeatureSpec::Pool,
                })
                .collect(),
            hidden: None,
            num_classes,
        }
    }

    pub fn conv_widths(&self) -> Vec<usize> {
        self.features
            .iter()
            .filter_map(|f| match f {
                FeatureSpec::Conv { width } => Some(*width),
                FeatureSpec::Pool => None,
            })
            .collect()
    }

    /// `[channels, height, width]` of the feature map fed to the classifier.
    pub fn feature_output(&self) -> Result<[usize; 3]> {
        let [mut c, mut h, mut w] = self.input.dims();
        for f in &self.features {
            match f {
                FeatureSpec::Conv { width } => c = *width,
                FeatureSpec::Pool => {
                    if h % 2 != 0 || w % 2 != 0 {
                        return Err(PruneError::Config(format!(
                            "max-pool applied to odd feature map {h}x{w}"
                        )));
                    }
                    h /= 2;
                    w /= 2;
                }
            }
        }
        Ok([c, h, w])
    }

    pub fn hidden_width(&self) -> usize {
        self.hidden
            .unwrap_or_else(|| self.conv_widths().last().copied().unwrap_or(self.input.channels))
    }

    pub fn validate(&self) -> Result<()> {
        if self.conv_widths().is_empty() {
            return Err(PruneError::Config("architecture has no conv layers".to_string()));
        }
        if self.num_classes < 2 {
            return Err(PruneError::Config(format!(
                "need at least 2 classes, got {}",
                self.num_classes
            )));
        }
        if self.hidden == Some(0) {
            return Err(PruneError::Config("hidden width must be positive".to_string()));
        }
        self.feature_output().map(|_| ())
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let spec: NetworkSpec = serde_json::from_reader(reader)?;
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vgg16_has_thirteen_convs_and_flattens_to_512() {
        let spec = NetworkSpec::vgg16(10);
        assert_eq!(spec.conv_widths().len(), 13);
        assert_eq!(spec.feature_output().unwrap(), [512, 1, 1]);
        assert_eq!(spec.hidden_width(), 512);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn parses_arch_string() {
        let input = InputShape { channels: 1, height: 8, width: 8 };
        let spec = NetworkSpec::from_arch("tiny", "4, M, 8,8,M", input, 3).unwrap();
        assert_eq!(spec.conv_widths(), vec![4, 8, 8]);
        assert_eq!(spec.feature_output().unwrap(), [8, 2, 2]);
    }

    #[test]
    fn rejects_bad_tokens_and_odd_pools() {
        let input = InputShape { channels: 1, height: 6, width: 6 };
        assert!(NetworkSpec::from_arch("x", "4,Q", input, 3).is_err());
        assert!(NetworkSpec::from_arch("x", "4,M,M", input, 3).is_err());
        assert!(NetworkSpec::from_arch("x", "M", input, 3).is_err());
    }

    #[test]
    fn json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arch.json");
        let path = path.to_str().unwrap();
        let spec = NetworkSpec::vgg16(100);
        spec.save_json(path).unwrap();
        assert_eq!(NetworkSpec::load_json(path).unwrap(), spec);
    }
}
