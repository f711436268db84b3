use crate::common::*;

/// Extra operations on `[channels, height, width]` image tensors.
pub trait TensorExt {
    fn f_rgb_to_grayscale(&self) -> Result<Tensor>;

    /// Computes `ratio * self + (1 - ratio) * other`, clamped to `[0, 1]`.
    fn f_blend(&self, other: &Tensor, ratio: f64) -> Result<Tensor>;

    /// Subtracts per-channel mean and divides by per-channel std.
    fn f_normalize_channels(&self, mean: &[f64; 3], std: &[f64; 3]) -> Result<Tensor>;

    fn f_denormalize_channels(&self, mean: &[f64; 3], std: &[f64; 3]) -> Result<Tensor>;

    /// Rotates the image around its center with bilinear sampling and zero padding.
    fn f_rotate2d(&self, radians: f64) -> Result<Tensor>;
}

impl TensorExt for Tensor {
    fn f_rgb_to_grayscale(&self) -> Result<Tensor> {
        let (channels, height, width) = self.size3()?;
        ensure!(
            channels == 3,
            "channel size must be 3, but get {}",
            channels
        );

        let gray =
            self.select(0, 0) * 0.2989 + self.select(0, 1) * 0.587 + self.select(0, 2) * 0.114;
        let gray = gray
            .unsqueeze(0)
            .expand(&[3, height, width], false)
            .contiguous();
        Ok(gray)
    }

    fn f_blend(&self, other: &Tensor, ratio: f64) -> Result<Tensor> {
        ensure!(
            self.size() == other.size(),
            "cannot blend tensors of shapes {:?} and {:?}",
            self.size(),
            other.size()
        );
        let blended = (self * ratio + other * (1.0 - ratio)).clamp(0.0, 1.0);
        Ok(blended)
    }

    fn f_normalize_channels(&self, mean: &[f64; 3], std: &[f64; 3]) -> Result<Tensor> {
        let (mean, std) = channel_stats(self, mean, std)?;
        Ok((self - mean) / std)
    }

    fn f_denormalize_channels(&self, mean: &[f64; 3], std: &[f64; 3]) -> Result<Tensor> {
        let (mean, std) = channel_stats(self, mean, std)?;
        Ok(self * std + mean)
    }

    fn f_rotate2d(&self, radians: f64) -> Result<Tensor> {
        tch::no_grad(|| -> Result<_> {
            let (channels, height, width) = self.size3()?;
            ensure!(
                self.kind() == Kind::Float,
                "expect a float tensor, but get {:?}",
                self.kind()
            );

            let (sin, cos) = (radians.sin() as f32, radians.cos() as f32);
            let theta = Tensor::of_slice(&[cos, -sin, 0.0, sin, cos, 0.0])
                .view([1, 2, 3])
                .to_device(self.device());
            let grid = Tensor::affine_grid_generator(&theta, &[1, channels, height, width], false);

            // interpolation_mode = 0 (bilinear), padding_mode = 0 (zeros)
            let rotated = self
                .unsqueeze(0)
                .grid_sampler(&grid, 0, 0, false)
                .select(0, 0);
            Ok(rotated)
        })
    }
}

fn channel_stats(image: &Tensor, mean: &[f64; 3], std: &[f64; 3]) -> Result<(Tensor, Tensor)> {
    let channel_dim = match image.dim() {
        3 => 0,
        4 => 1,
        dim => bail!("expect a 3D or 4D tensor, but get {} dimensions", dim),
    };
    let channels = image.size()[channel_dim];
    ensure!(
        channels == 3,
        "channel size must be 3, but get {}",
        channels
    );
    ensure!(
        std.iter().all(|&val| val > 0.0),
        "std values must be positive, but get {:?}",
        std
    );

    let shape: &[i64] = if channel_dim == 0 { &[3, 1, 1] } else { &[1, 3, 1, 1] };
    let to_tensor = |values: &[f64; 3]| {
        let values: Vec<f32> = values.iter().map(|&val| val as f32).collect();
        Tensor::of_slice(&values)
            .view(shape)
            .to_device(image.device())
    };

    Ok((to_tensor(mean), to_tensor(std)))
}
