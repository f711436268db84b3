//! Random area/aspect crop followed by a resize.

use super::ResizeFilter;
use crate::common::*;
use image::imageops;

const MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RandomResizedCropInit {
    pub size: usize,
    /// Range of the cropped area relative to the source area.
    pub scale: (R64, R64),
    /// Range of the crop aspect ratio (width / height).
    pub ratio: (R64, R64),
    pub filter: ResizeFilter,
}

impl RandomResizedCropInit {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            scale: (r64(0.08), r64(1.0)),
            ratio: (r64(3.0 / 4.0), r64(4.0 / 3.0)),
            filter: ResizeFilter::Triangle,
        }
    }

    pub fn build(self) -> Result<RandomResizedCrop> {
        let Self {
            size,
            scale: (min_scale, max_scale),
            ratio: (min_ratio, max_ratio),
            filter,
        } = self;

        ensure!(size > 0, "size must be positive");
        let size =
            u32::try_from(size).map_err(|_| format_err!("size {} is too large", size))?;
        ensure!(
            min_scale > 0.0 && min_scale <= max_scale && max_scale <= 1.0,
            "invalid scale range ({}, {})",
            min_scale,
            max_scale
        );
        ensure!(
            min_ratio > 0.0 && min_ratio <= max_ratio,
            "invalid ratio range ({}, {})",
            min_ratio,
            max_ratio
        );

        Ok(RandomResizedCrop {
            size,
            scale: (min_scale.raw(), max_scale.raw()),
            log_ratio: (min_ratio.raw().ln(), max_ratio.raw().ln()),
            filter: filter.into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RandomResizedCrop {
    size: u32,
    scale: (f64, f64),
    log_ratio: (f64, f64),
    filter: FilterType,
}

impl RandomResizedCrop {
    pub fn forward(&self, image: &RgbImage, rng: &mut StdRng) -> RgbImage {
        let (left, top, width, height) = self.sample_window(image.dimensions(), rng);
        let cropped = imageops::crop_imm(image, left, top, width, height).to_image();
        imageops::resize(&cropped, self.size, self.size, self.filter)
    }

    /// Returns `(left, top, width, height)` of the crop window.
    fn sample_window(
        &self,
        (width, height): (u32, u32),
        rng: &mut StdRng,
    ) -> (u32, u32, u32, u32) {
        let area = (width * height) as f64;
        let (min_scale, max_scale) = self.scale;
        let (min_log_ratio, max_log_ratio) = self.log_ratio;

        for _ in 0..MAX_ATTEMPTS {
            let target_area = area * rng.gen_range(min_scale..=max_scale);
            let aspect_ratio = rng.gen_range(min_log_ratio..=max_log_ratio).exp();

            let crop_w = (target_area * aspect_ratio).sqrt().round() as u32;
            let crop_h = (target_area / aspect_ratio).sqrt().round() as u32;

            if 0 < crop_w && crop_w <= width && 0 < crop_h && crop_h <= height {
                let top = rng.gen_range(0..=(height - crop_h));
                let left = rng.gen_range(0..=(width - crop_w));
                return (left, top, crop_w, crop_h);
            }
        }

        // fall back to a center crop
        let in_ratio = width as f64 / height as f64;
        let min_ratio = min_log_ratio.exp();
        let max_ratio = max_log_ratio.exp();
        let (crop_w, crop_h) = if in_ratio < min_ratio {
            (width, ((width as f64 / min_ratio).round() as u32).clamp(1, height))
        } else if in_ratio > max_ratio {
            (((height as f64 * max_ratio).round() as u32).clamp(1, width), height)
        } else {
            (width, height)
        };
        ((width - crop_w) / 2, (height - crop_h) / 2, crop_w, crop_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_oversized_crop() {
        assert!(RandomResizedCropInit::new(u32::MAX as usize + 1).build().is_err());
        assert!(RandomResizedCropInit::new(0).build().is_err());
    }

    #[test]
    fn crop_output_size_and_reproducibility() -> Result<()> {
        let crop = RandomResizedCropInit::new(32).build()?;
        let image = RgbImage::from_fn(120, 80, |x, y| image::Rgb([x as u8, y as u8, 0]));

        let lhs = crop.forward(&image, &mut StdRng::seed_from_u64(3));
        let rhs = crop.forward(&image, &mut StdRng::seed_from_u64(3));
        assert_eq!(lhs.dimensions(), (32, 32));
        assert_eq!(lhs, rhs);
        Ok(())
    }

    #[test]
    fn window_stays_inside_image() -> Result<()> {
        let crop = RandomResizedCropInit::new(16).build()?;
        let mut rng = StdRng::seed_from_u64(0);

        for dims in [(64, 64), (200, 10), (10, 200), (1, 1)] {
            for _ in 0..50 {
                let (left, top, width, height) = crop.sample_window(dims, &mut rng);
                assert!(width > 0 && height > 0);
                assert!(left + width <= dims.0);
                assert!(top + height <= dims.1);
            }
        }
        Ok(())
    }

    #[test]
    fn reject_invalid_ranges() {
        let mut init = RandomResizedCropInit::new(16);
        init.scale = (r64(0.5), r64(0.1));
        assert!(init.build().is_err());
    }
}
