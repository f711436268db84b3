//! The random color distortion algorithm.

use crate::common::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ColorJitterInit {
    pub brightness: Option<R64>,
    pub contrast: Option<R64>,
    pub saturation: Option<R64>,
}

impl ColorJitterInit {
    pub fn build(self) -> Result<ColorJitter> {
        let Self {
            brightness,
            contrast,
            saturation,
        } = self;

        let to_range = |name: &str, value: Option<R64>| -> Result<_> {
            value
                .map(|value| {
                    ensure!(value >= 0.0, "{} must be non-negative", name);
                    let value = value.raw();
                    Ok(((1.0 - value).max(0.0), 1.0 + value))
                })
                .transpose()
        };

        Ok(ColorJitter {
            brightness: to_range("brightness", brightness)?,
            contrast: to_range("contrast", contrast)?,
            saturation: to_range("saturation", saturation)?,
        })
    }
}

/// Scales brightness, contrast and saturation by random factors, in random order.
#[derive(Debug, Clone)]
pub struct ColorJitter {
    brightness: Option<(f64, f64)>,
    contrast: Option<(f64, f64)>,
    saturation: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy)]
enum Adjustment {
    Brightness,
    Contrast,
    Saturation,
}

impl ColorJitter {
    /// Distorts a `[3, height, width]` tensor with values in `[0, 1]`.
    pub fn forward(&self, rgb: &Tensor, rng: &mut StdRng) -> Result<Tensor> {
        tch::no_grad(|| -> Result<_> {
            let (channels, _height, _width) = rgb.size3()?;
            ensure!(
                channels == 3,
                "channel size must be 3, but get {}",
                channels
            );

            let mut order = [
                Adjustment::Brightness,
                Adjustment::Contrast,
                Adjustment::Saturation,
            ];
            order.shuffle(rng);

            let mut image = rgb.shallow_clone();

            for adjustment in order {
                image = match adjustment {
                    Adjustment::Brightness => match self.brightness {
                        Some((lo, up)) => {
                            let factor = rng.gen_range(lo..=up);
                            image.f_blend(&image.zeros_like(), factor)?
                        }
                        None => image,
                    },
                    Adjustment::Contrast => match self.contrast {
                        Some((lo, up)) => {
                            let factor = rng.gen_range(lo..=up);
                            let mean = image.f_rgb_to_grayscale()?.mean(Kind::Float);
                            let degenerate = image.zeros_like() + mean;
                            image.f_blend(&degenerate, factor)?
                        }
                        None => image,
                    },
                    Adjustment::Saturation => match self.saturation {
                        Some((lo, up)) => {
                            let factor = rng.gen_range(lo..=up);
                            let gray = image.f_rgb_to_grayscale()?;
                            image.f_blend(&gray, factor)?
                        }
                        None => image,
                    },
                };
            }

            Ok(image)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_jitter_is_identity() -> Result<()> {
        let jitter = ColorJitterInit::default().build()?;
        let image = Tensor::rand(&[3, 8, 8], (Kind::Float, Device::Cpu));
        let output = jitter.forward(&image, &mut StdRng::seed_from_u64(1))?;
        assert!(output.equal(&image));
        Ok(())
    }

    #[test]
    fn jitter_stays_in_range() -> Result<()> {
        let jitter = ColorJitterInit {
            brightness: Some(r64(0.05)),
            contrast: Some(r64(0.5)),
            saturation: Some(r64(0.05)),
        }
        .build()?;
        let image = Tensor::rand(&[3, 8, 8], (Kind::Float, Device::Cpu));

        let lhs = jitter.forward(&image, &mut StdRng::seed_from_u64(5))?;
        let rhs = jitter.forward(&image, &mut StdRng::seed_from_u64(5))?;
        assert!(lhs.equal(&rhs));
        assert!(f64::from(lhs.min()) >= 0.0);
        assert!(f64::from(lhs.max()) <= 1.0);
        Ok(())
    }

    #[test]
    fn reject_negative_factor() {
        let init = ColorJitterInit {
            brightness: Some(r64(-0.1)),
            ..Default::default()
        };
        assert!(init.build().is_err());
    }
}
