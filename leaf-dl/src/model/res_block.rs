use super::conv_bn_2d::{ConvBn2D, ConvBn2DInit};
use crate::common::*;
use std::borrow::Borrow;

/// A basic residual block of two 3x3 convolutions.
#[derive(Debug, Clone)]
pub struct ResBlockInit {
    pub in_c: usize,
    pub out_c: usize,
    pub stride: usize,
}

impl ResBlockInit {
    pub fn build<'p, P>(self, path: P) -> ResBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            in_c,
            out_c,
            stride,
        } = self;

        let conv1 = ConvBn2DInit {
            s: stride,
            ..ConvBn2DInit::new(in_c, out_c, 3)
        }
        .build(path / "conv1");
        let conv2 = ConvBn2DInit {
            relu: false,
            ..ConvBn2DInit::new(out_c, out_c, 3)
        }
        .build(path / "conv2");

        // projection when the shape changes
        let shortcut = (stride != 1 || in_c != out_c).then(|| {
            ConvBn2DInit {
                s: stride,
                p: 0,
                relu: false,
                ..ConvBn2DInit::new(in_c, out_c, 1)
            }
            .build(path / "shortcut")
        });

        ResBlock {
            conv1,
            conv2,
            shortcut,
        }
    }
}

#[derive(Debug)]
pub struct ResBlock {
    conv1: ConvBn2D,
    conv2: ConvBn2D,
    shortcut: Option<ConvBn2D>,
}

impl nn::ModuleT for ResBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let ys = xs.apply_t(&self.conv1, train).apply_t(&self.conv2, train);
        let identity = match &self.shortcut {
            Some(shortcut) => xs.apply_t(shortcut, train),
            None => xs.shallow_clone(),
        };
        (ys + identity).relu()
    }
}
