use crate::common::*;
use std::borrow::Borrow;

#[derive(Debug, Clone)]
pub struct ConvBn2DInit {
    pub in_c: usize,
    pub out_c: usize,
    pub k: usize,
    pub s: usize,
    pub p: usize,
    pub relu: bool,
}

impl ConvBn2DInit {
    pub fn new(in_c: usize, out_c: usize, k: usize) -> Self {
        Self {
            in_c,
            out_c,
            k,
            s: 1,
            p: k / 2,
            relu: true,
        }
    }

    pub fn build<'p, P>(self, path: P) -> ConvBn2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_c,
            out_c,
            k,
            s,
            p,
            relu,
        } = self;

        let conv = nn::conv2d(
            path / "conv",
            in_c as i64,
            out_c as i64,
            k as i64,
            nn::ConvConfig {
                stride: s as i64,
                padding: p as i64,
                bias: false,
                ..Default::default()
            },
        );
        let bn = nn::batch_norm2d(path / "bn", out_c as i64, Default::default());

        ConvBn2D { conv, bn, relu }
    }
}

/// Convolution followed by batch normalization and an optional ReLU.
#[derive(Debug)]
pub struct ConvBn2D {
    conv: nn::Conv2D,
    bn: nn::BatchNorm,
    relu: bool,
}

impl nn::ModuleT for ConvBn2D {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let xs = xs.apply(&self.conv).apply_t(&self.bn, train);
        if self.relu {
            xs.relu()
        } else {
            xs
        }
    }
}
