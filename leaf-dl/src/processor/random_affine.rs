use crate::common::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RandomAffineInit {
    pub rotate_degrees: Option<R64>,
    pub horizontal_flip_prob: Ratio,
    pub vertical_flip_prob: Ratio,
}

impl RandomAffineInit {
    pub fn build(self) -> Result<RandomAffine> {
        let Self {
            rotate_degrees,
            horizontal_flip_prob,
            vertical_flip_prob,
        } = self;

        let rotate_radians = rotate_degrees
            .map(|val| {
                ensure!(val >= 0.0, "rotate_degrees must be non-negative");
                Ok(val.raw().to_radians())
            })
            .transpose()?;

        Ok(RandomAffine {
            rotate_radians,
            horizontal_flip_prob: horizontal_flip_prob.to_f64(),
            vertical_flip_prob: vertical_flip_prob.to_f64(),
        })
    }
}

impl Default for RandomAffineInit {
    fn default() -> Self {
        Self {
            rotate_degrees: None,
            horizontal_flip_prob: Ratio::zero(),
            vertical_flip_prob: Ratio::zero(),
        }
    }
}

/// Random flips and rotation of image tensors.
#[derive(Debug, Clone)]
pub struct RandomAffine {
    rotate_radians: Option<f64>,
    horizontal_flip_prob: f64,
    vertical_flip_prob: f64,
}

impl RandomAffine {
    /// Transforms a `[channels, height, width]` float tensor.
    pub fn forward(&self, image: &Tensor, rng: &mut StdRng) -> Result<Tensor> {
        tch::no_grad(|| -> Result<_> {
            let (_channels, _height, _width) = image.size3()?;

            let image = if rng.gen_bool(self.horizontal_flip_prob) {
                image.flip(&[2])
            } else {
                image.shallow_clone()
            };
            let image = if rng.gen_bool(self.vertical_flip_prob) {
                image.flip(&[1])
            } else {
                image
            };
            let image = match self.rotate_radians {
                Some(max_radians) if max_radians > 0.0 => {
                    let radians = rng.gen_range(-max_radians..=max_radians);
                    image.f_rotate2d(radians)?
                }
                _ => image,
            };

            Ok(image)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certain_flips() -> Result<()> {
        let affine = RandomAffineInit {
            horizontal_flip_prob: Ratio::one(),
            vertical_flip_prob: Ratio::one(),
            ..Default::default()
        }
        .build()?;
        let image = Tensor::arange(12, (Kind::Float, Device::Cpu)).view([1, 3, 4]);

        let output = affine.forward(&image, &mut StdRng::seed_from_u64(0))?;
        assert!(output.equal(&image.flip(&[1, 2])));
        Ok(())
    }

    #[test]
    fn rotation_keeps_shape() -> Result<()> {
        let affine = RandomAffineInit {
            rotate_degrees: Some(r64(20.0)),
            ..Default::default()
        }
        .build()?;
        let image = Tensor::rand(&[3, 10, 10], (Kind::Float, Device::Cpu));
        let output = affine.forward(&image, &mut StdRng::seed_from_u64(0))?;
        assert_eq!(output.size(), vec![3, 10, 10]);
        Ok(())
    }
}
