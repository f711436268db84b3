//! Classifier models.

mod conv_bn_2d;
mod res_block;
mod res_model;

pub use conv_bn_2d::*;
pub use res_block::*;
pub use res_model::*;

use crate::{common::*, error::LeafError};
use std::{borrow::Borrow, str::FromStr};

/// Names of the selectable model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    #[serde(rename = "res-model")]
    ResModel,
}

impl ModelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResModel => "res-model",
        }
    }
}

impl Display for ModelVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "res-model" => Ok(Self::ResModel),
            _ => bail!("unknown model variant '{}'", name),
        }
    }
}

/// The model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ModelConfig {
    ResModel(ResModelConfig),
}

impl ModelConfig {
    pub fn variant(&self) -> ModelVariant {
        match self {
            Self::ResModel(_) => ModelVariant::ResModel,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::ResModel(Default::default())
    }
}

/// The residual model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResModelConfig {
    pub base_channels: usize,
    pub stage_blocks: Vec<usize>,
    #[serde(default)]
    pub dropout: f64,
}

impl Default for ResModelConfig {
    fn default() -> Self {
        let ResModelInit {
            base_channels,
            stage_blocks,
            dropout,
            ..
        } = ResModelInit::new(1);

        Self {
            base_channels,
            stage_blocks,
            dropout,
        }
    }
}

/// The generic model adaptor.
#[derive(Debug)]
pub enum Model {
    ResModel(ResModel),
}

impl Model {
    /// Builds the model variant described by the configuration.
    pub fn new<'a>(
        path: impl Borrow<nn::Path<'a>>,
        config: &ModelConfig,
        num_classes: usize,
    ) -> Result<Self> {
        match config {
            ModelConfig::ResModel(ResModelConfig {
                base_channels,
                stage_blocks,
                dropout,
            }) => {
                let model = ResModelInit {
                    base_channels: *base_channels,
                    stage_blocks: stage_blocks.clone(),
                    dropout: *dropout,
                    ..ResModelInit::new(num_classes)
                }
                .build(path)?;
                Ok(Self::ResModel(model))
            }
        }
    }

    pub fn num_classes(&self) -> usize {
        match self {
            Self::ResModel(model) => model.num_classes(),
        }
    }

    /// Runs the model and checks the output is `[batch, num_classes]`.
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor, LeafError> {
        let batch_size = input.size().first().copied().unwrap_or(0);
        let output = match self {
            Self::ResModel(model) => nn::ModuleT::forward_t(model, input, train),
        };

        let expected = vec![batch_size, self.num_classes() as i64];
        let actual = output.size();
        if actual != expected {
            return Err(LeafError::ShapeMismatch { expected, actual });
        }
        Ok(output)
    }
}
