use super::{
    conv_bn_2d::{ConvBn2D, ConvBn2DInit},
    res_block::{ResBlock, ResBlockInit},
};
use crate::common::*;
use std::borrow::Borrow;

#[derive(Debug, Clone)]
pub struct ResModelInit {
    pub input_channels: usize,
    pub num_classes: usize,
    /// Channels of the first stage. Each later stage doubles it.
    pub base_channels: usize,
    /// Number of residual blocks per stage.
    pub stage_blocks: Vec<usize>,
    pub dropout: f64,
}

impl ResModelInit {
    pub fn new(num_classes: usize) -> Self {
        Self {
            input_channels: 3,
            num_classes,
            base_channels: 32,
            stage_blocks: vec![1, 1, 1, 1],
            dropout: 0.0,
        }
    }

    pub fn build<'p, P>(self, path: P) -> Result<ResModel>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            input_channels,
            num_classes,
            base_channels,
            stage_blocks,
            dropout,
        } = self;

        ensure!(input_channels > 0, "input_channels must be positive");
        ensure!(num_classes > 0, "num_classes must be positive");
        ensure!(base_channels > 0, "base_channels must be positive");
        ensure!(
            !stage_blocks.is_empty() && stage_blocks.iter().all(|&num| num > 0),
            "stage_blocks must be non-empty positive numbers"
        );
        ensure!(
            (0.0..1.0).contains(&dropout),
            "dropout must be within [0, 1)"
        );

        let stem = ConvBn2DInit {
            s: 2,
            ..ConvBn2DInit::new(input_channels, base_channels, 7)
        }
        .build(path / "stem");

        let mut in_c = base_channels;
        let blocks: Vec<_> = stage_blocks
            .iter()
            .enumerate()
            .flat_map(|(stage_index, &num_blocks)| {
                (0..num_blocks).map(move |block_index| (stage_index, block_index))
            })
            .map(|(stage_index, block_index)| {
                let out_c = base_channels << stage_index;
                let stride = if stage_index > 0 && block_index == 0 {
                    2
                } else {
                    1
                };
                let block = ResBlockInit {
                    in_c,
                    out_c,
                    stride,
                }
                .build(path / format!("stage_{}", stage_index) / format!("block_{}", block_index));
                in_c = out_c;
                block
            })
            .collect();

        let linear = nn::linear(
            path / "classifier",
            in_c as i64,
            num_classes as i64,
            Default::default(),
        );

        Ok(ResModel {
            num_classes,
            stem,
            blocks,
            linear,
            dropout,
        })
    }
}

/// A residual convolutional classifier producing per-class log-probabilities.
#[derive(Debug)]
pub struct ResModel {
    num_classes: usize,
    stem: ConvBn2D,
    blocks: Vec<ResBlock>,
    linear: nn::Linear,
    dropout: f64,
}

impl ResModel {
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl nn::ModuleT for ResModel {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let xs = xs
            .apply_t(&self.stem, train)
            .max_pool2d(&[3, 3], &[2, 2], &[1, 1], &[1, 1], false);
        let xs = self
            .blocks
            .iter()
            .fold(xs, |xs, block| xs.apply_t(block, train));
        xs.adaptive_avg_pool2d(&[1, 1])
            .flatten(1, -1)
            .dropout(self.dropout, train)
            .apply(&self.linear)
            .log_softmax(-1, Kind::Float)
    }
}
