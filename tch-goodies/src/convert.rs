//! Conversions between `image` buffers and tensors.

use crate::common::*;

pub trait IntoTensor {
    /// Converts to a `[channels, height, width]` tensor of raw components.
    fn into_tensor(self) -> Tensor;
}

impl IntoTensor for &RgbImage {
    fn into_tensor(self) -> Tensor {
        let (width, height) = self.dimensions();
        Tensor::of_slice(self.as_raw())
            .view([height as i64, width as i64, 3])
            .permute(&[2, 0, 1])
            .contiguous()
    }
}

pub trait TryIntoTensor {
    type Error;

    fn try_into_tensor(self) -> Result<Tensor, Self::Error>;
}

impl TryIntoTensor for &DynamicImage {
    type Error = Error;

    /// Converts to a float RGB tensor with values in `[0, 1]`.
    fn try_into_tensor(self) -> Result<Tensor, Self::Error> {
        let rgb = self.to_rgb8();
        let (width, height) = rgb.dimensions();
        ensure!(width > 0 && height > 0, "the image is empty");
        Ok(rgb.into_tensor().to_kind(Kind::Float) / 255.0)
    }
}

pub trait TensorToImage {
    /// Converts a `[3, height, width]` float tensor in `[0, 1]` to an RGB image.
    fn f_to_rgb_image(&self) -> Result<RgbImage>;
}

impl TensorToImage for Tensor {
    fn f_to_rgb_image(&self) -> Result<RgbImage> {
        let (channels, height, width) = self.size3()?;
        ensure!(
            channels == 3,
            "channel size must be 3, but get {}",
            channels
        );

        let bytes = tch::no_grad(|| {
            (self.clamp(0.0, 1.0) * 255.0)
                .round()
                .to_kind(Kind::Uint8)
                .permute(&[1, 2, 0])
                .contiguous()
                .to_device(Device::Cpu)
        });
        let buffer: Vec<u8> = bytes.into();
        RgbImage::from_raw(width as u32, height as u32, buffer)
            .ok_or_else(|| format_err!("buffer size does not match {}x{}", width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tensor_layout() -> Result<()> {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(2, 1, Rgb([10, 20, 30]));

        let tensor = (&image).into_tensor();
        assert_eq!(tensor.size(), vec![3, 2, 3]);
        assert_eq!(tensor.kind(), Kind::Uint8);
        assert_eq!(i64::from(tensor.get(0).get(1).get(2)), 10);
        assert_eq!(i64::from(tensor.get(2).get(1).get(2)), 30);
        Ok(())
    }

    #[test]
    fn tensor_back_to_image() -> Result<()> {
        let mut image = RgbImage::new(4, 5);
        image.put_pixel(1, 3, Rgb([255, 128, 0]));

        let tensor = (&DynamicImage::ImageRgb8(image.clone())).try_into_tensor()?;
        let restored = tensor.f_to_rgb_image()?;
        assert_eq!(restored, image);
        Ok(())
    }
}
