use super::{
    ColorJitter, ColorJitterInit, PreprocessSpec, RandomAffine, RandomAffineInit,
    RandomResizedCrop, RandomResizedCropInit,
};
use crate::common::*;
use image::imageops;

/// Turns a decoded image into a `[3, size, size]` input tensor.
///
/// Random transforms draw only from the given generator, so the output is
/// reproducible for a fixed seed.
pub trait SampleTransform: Debug + Send + Sync {
    fn forward(&self, image: DynamicImage, rng: &mut StdRng) -> Result<Tensor>;

    fn image_size(&self) -> usize;
}

impl SampleTransform for PreprocessSpec {
    fn forward(&self, image: DynamicImage, _rng: &mut StdRng) -> Result<Tensor> {
        PreprocessSpec::forward(self, &image)
    }

    fn image_size(&self) -> usize {
        self.image_size
    }
}

/// Options of the training augmentation chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrainTransformInit {
    /// Center-crop the source image to this size before anything else.
    pub center_crop: Option<usize>,
    pub crop_scale: (R64, R64),
    pub crop_ratio: (R64, R64),
    pub brightness: Option<R64>,
    pub contrast: Option<R64>,
    pub saturation: Option<R64>,
    pub horizontal_flip_prob: Ratio,
    pub vertical_flip_prob: Ratio,
    pub rotate_degrees: Option<R64>,
    pub grayscale_prob: Ratio,
}

impl Default for TrainTransformInit {
    fn default() -> Self {
        Self {
            center_crop: None,
            crop_scale: (r64(0.08), r64(1.0)),
            crop_ratio: (r64(3.0 / 4.0), r64(4.0 / 3.0)),
            brightness: Some(r64(0.05)),
            contrast: Some(r64(0.5)),
            saturation: Some(r64(0.05)),
            horizontal_flip_prob: Ratio::try_from(0.5).unwrap(),
            vertical_flip_prob: Ratio::try_from(0.5).unwrap(),
            rotate_degrees: Some(r64(20.0)),
            grayscale_prob: Ratio::try_from(0.1).unwrap(),
        }
    }
}

impl TrainTransformInit {
    /// Builds the chain. It ends with the resize and normalization of `spec`.
    pub fn build(self, spec: PreprocessSpec) -> Result<TrainTransform> {
        let Self {
            center_crop,
            crop_scale,
            crop_ratio,
            brightness,
            contrast,
            saturation,
            horizontal_flip_prob,
            vertical_flip_prob,
            rotate_degrees,
            grayscale_prob,
        } = self;

        spec.validate()?;
        let center_crop = center_crop
            .map(|size| {
                ensure!(size > 0, "center_crop must be positive");
                u32::try_from(size).map_err(|_| format_err!("center_crop {} is too large", size))
            })
            .transpose()?;

        let random_crop = RandomResizedCropInit {
            size: spec.image_size,
            scale: crop_scale,
            ratio: crop_ratio,
            filter: spec.filter,
        }
        .build()?;
        let color_jitter = ColorJitterInit {
            brightness,
            contrast,
            saturation,
        }
        .build()?;
        let random_affine = RandomAffineInit {
            rotate_degrees,
            horizontal_flip_prob,
            vertical_flip_prob,
        }
        .build()?;

        Ok(TrainTransform {
            spec,
            center_crop,
            random_crop,
            color_jitter,
            random_affine,
            grayscale_prob: grayscale_prob.to_f64(),
        })
    }
}

/// The randomized augmentation chain used on training samples.
#[derive(Debug, Clone)]
pub struct TrainTransform {
    spec: PreprocessSpec,
    center_crop: Option<u32>,
    random_crop: RandomResizedCrop,
    color_jitter: ColorJitter,
    random_affine: RandomAffine,
    grayscale_prob: f64,
}

impl TrainTransform {
    pub fn spec(&self) -> &PreprocessSpec {
        &self.spec
    }
}

impl SampleTransform for TrainTransform {
    fn forward(&self, image: DynamicImage, rng: &mut StdRng) -> Result<Tensor> {
        let rgb = image.into_rgb8();
        let rgb = match self.center_crop {
            Some(size) => {
                let (width, height) = rgb.dimensions();
                let crop_w = size.min(width);
                let crop_h = size.min(height);
                let left = (width - crop_w) / 2;
                let top = (height - crop_h) / 2;
                imageops::crop_imm(&rgb, left, top, crop_w, crop_h).to_image()
            }
            None => rgb,
        };
        let rgb = self.random_crop.forward(&rgb, rng);

        let tensor = rgb.into_tensor().to_kind(Kind::Float) / 255.0;
        let tensor = self.color_jitter.forward(&tensor, rng)?;
        let tensor = self.random_affine.forward(&tensor, rng)?;
        let tensor = if rng.gen_bool(self.grayscale_prob) {
            tensor.f_rgb_to_grayscale()?
        } else {
            tensor
        };

        self.spec.normalize(&tensor)
    }

    fn image_size(&self) -> usize {
        self.spec.image_size
    }
}
