use crate::common::*;
use image::imageops;

/// Per-channel mean of the leaf image collection.
pub const DEFAULT_MEAN: [f64; 3] = [0.44050441, 0.47175582, 0.4283929];
/// Per-channel standard deviation of the leaf image collection.
pub const DEFAULT_STD: [f64; 3] = [0.16995976, 0.14400921, 0.19573698];
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// Interpolation used when resizing images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::Triangle
    }
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// The deterministic image-to-tensor transform.
///
/// It resizes to `image_size` x `image_size`, scales pixel values to
/// `[0, 1]` and normalizes each channel. The same spec is persisted after
/// training and loaded by the prediction service, so both sides see
/// identical input tensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessSpec {
    pub image_size: usize,
    pub mean: [f64; 3],
    pub std: [f64; 3],
    #[serde(default)]
    pub filter: ResizeFilter,
}

impl Default for PreprocessSpec {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            mean: DEFAULT_MEAN,
            std: DEFAULT_STD,
            filter: ResizeFilter::default(),
        }
    }
}

impl PreprocessSpec {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.image_size > 0, "image_size must be positive");
        ensure!(
            u32::try_from(self.image_size).is_ok(),
            "image_size {} is too large",
            self.image_size
        );
        ensure!(
            self.std.iter().all(|&val| val.is_finite() && val > 0.0),
            "std values must be positive, but get {:?}",
            self.std
        );
        ensure!(
            self.mean.iter().all(|val| val.is_finite()),
            "mean values must be finite, but get {:?}",
            self.mean
        );
        Ok(())
    }

    /// Decodes an encoded image and transforms it.
    pub fn forward_bytes(&self, bytes: &[u8]) -> Result<Tensor> {
        let image = image::load_from_memory(bytes)?;
        self.forward(&image)
    }

    /// Produces a `[3, image_size, image_size]` float tensor.
    pub fn forward(&self, image: &DynamicImage) -> Result<Tensor> {
        let size = u32::try_from(self.image_size)
            .map_err(|_| format_err!("image_size {} is too large", self.image_size))?;
        let rgb = image.to_rgb8();
        let resized = imageops::resize(&rgb, size, size, self.filter.into());
        self.normalize_image(&resized)
    }

    /// Converts an RGB image of any size to a normalized tensor.
    pub fn normalize_image(&self, rgb: &RgbImage) -> Result<Tensor> {
        let tensor = rgb.into_tensor().to_kind(Kind::Float) / 255.0;
        self.normalize(&tensor)
    }

    /// Normalizes a float tensor with values in `[0, 1]`.
    pub fn normalize(&self, tensor: &Tensor) -> Result<Tensor> {
        tensor.f_normalize_channels(&self.mean, &self.std)
    }

    /// Maps normalized values back to `[0, 1]`.
    pub fn denormalize(&self, tensor: &Tensor) -> Result<Tensor> {
        Ok(tensor
            .f_denormalize_channels(&self.mean, &self.std)?
            .clamp(0.0, 1.0))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write transform file '{}'", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read transform file '{}'", path.display()))?;
        let spec: Self = serde_json::from_str(&text)?;
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb};
    use std::io::Cursor;

    fn encoded_png(width: u32, height: u32) -> Result<Vec<u8>> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = vec![];
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
        Ok(bytes)
    }

    #[test]
    fn output_shape_and_determinism() -> Result<()> {
        let spec = PreprocessSpec::default();
        let bytes = encoded_png(300, 180)?;

        let first = spec.forward_bytes(&bytes)?;
        let second = spec.forward_bytes(&bytes)?;
        assert_eq!(first.size(), vec![3, 224, 224]);
        assert_eq!(first.kind(), Kind::Float);
        assert!(first.equal(&second));
        Ok(())
    }

    #[test]
    fn normalization_constants_apply() -> Result<()> {
        let spec = PreprocessSpec {
            image_size: 2,
            ..Default::default()
        };
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 255])));
        let tensor = spec.forward(&image)?;

        let red = f64::from(tensor.get(0).get(0).get(0));
        let green = f64::from(tensor.get(1).get(1).get(1));
        assert!((red - (1.0 - DEFAULT_MEAN[0]) / DEFAULT_STD[0]).abs() < 1e-4);
        assert!((green - (0.0 - DEFAULT_MEAN[1]) / DEFAULT_STD[1]).abs() < 1e-4);

        let restored = spec.denormalize(&tensor)?;
        assert!((f64::from(restored.get(0).get(0).get(0)) - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn reject_oversized_image_size() {
        let spec = PreprocessSpec {
            image_size: u32::MAX as usize + 1,
            ..Default::default()
        };
        assert!(spec.validate().is_err());
        assert!(PreprocessSpec {
            image_size: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn spec_file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("transform.json");
        let spec = PreprocessSpec::default();
        spec.save(&path)?;
        assert_eq!(PreprocessSpec::load(&path)?, spec);

        fs::write(&path, r#"{"image_size": 224, "mean": [0, 0, 0], "std": [0, 1, 1]}"#)?;
        assert!(PreprocessSpec::load(&path).is_err());
        Ok(())
    }
}
