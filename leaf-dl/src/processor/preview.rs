use super::PreprocessSpec;
use crate::{common::*, error::LeafError};

/// Renders the first images of a batch into a grid for visual inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPreview {
    num_images: usize,
}

impl BatchPreview {
    /// Fails unless `0 < num_images < batch_size`.
    pub fn new(num_images: usize, batch_size: usize) -> Result<Self, LeafError> {
        if num_images == 0 || num_images >= batch_size {
            return Err(LeafError::PreviewExceedsBatch {
                requested: num_images,
                batch_size,
            });
        }
        Ok(Self { num_images })
    }

    pub fn num_images(&self) -> usize {
        self.num_images
    }

    /// Denormalizes `[batch, 3, height, width]` images and tiles them.
    ///
    /// A batch smaller than the requested count is drawn entirely.
    pub fn render(&self, images: &Tensor, spec: &PreprocessSpec) -> Result<RgbImage> {
        tch::no_grad(|| -> Result<_> {
            let (batch_size, channels, height, width) = images.size4()?;
            ensure!(batch_size > 0, "cannot preview an empty batch");
            let num_images = (self.num_images as i64).min(batch_size);

            let num_cols = (num_images as f64).sqrt().ceil() as i64;
            let num_rows = (num_images + num_cols - 1) / num_cols;
            let canvas = Tensor::zeros(
                &[channels, num_rows * height, num_cols * width],
                (Kind::Float, Device::Cpu),
            );

            for index in 0..num_images {
                let image = spec.denormalize(&images.select(0, index).to_device(Device::Cpu))?;
                let (row, col) = (index / num_cols, index % num_cols);
                let mut tile = canvas
                    .narrow(1, row * height, height)
                    .narrow(2, col * width, width);
                tile.copy_(&image);
            }

            canvas.f_to_rgb_image()
        })
    }
}
