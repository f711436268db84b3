use crate::common::*;

/// A floating value validated to lie within `[0.0, 1.0]`.
///
/// It is used for probabilities and proportions in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Ratio(R64);

impl Ratio {
    pub fn zero() -> Self {
        Self(r64(0.0))
    }

    pub fn one() -> Self {
        Self(r64(1.0))
    }

    pub fn to_r64(&self) -> R64 {
        self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0.raw()
    }

    pub fn checked_add(&self, rhs: Ratio) -> Result<Self> {
        Self::try_from(self.0 + rhs.0)
    }

    /// Returns `1.0 - self`.
    pub fn complement(&self) -> Self {
        Self(r64(1.0) - self.0)
    }
}

impl Serialize for Ratio {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Self::try_from(value).map_err(|err| D::Error::custom(format!("{:?}", err)))
    }
}

impl AbsDiffEq<f64> for Ratio {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &f64, epsilon: Self::Epsilon) -> bool {
        self.0.raw().abs_diff_eq(other, epsilon)
    }
}

impl TryFrom<R64> for Ratio {
    type Error = Error;

    fn try_from(value: R64) -> Result<Self, Self::Error> {
        ensure!(
            ((0.0 - f64::default_epsilon())..=(1.0 + f64::default_epsilon()))
                .contains(&value.raw()),
            "ratio value must be within range [0.0, 1.0], but get {}",
            value
        );
        let value = value.max(r64(0.0)).min(r64(1.0));
        Ok(Self(value))
    }
}

impl TryFrom<f64> for Ratio {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::try_from(R64::try_new(value).ok_or_else(|| format_err!("not a finite value"))?)
    }
}

impl From<Ratio> for f64 {
    fn from(ratio: Ratio) -> Self {
        ratio.0.raw()
    }
}

impl Mul<usize> for Ratio {
    type Output = f64;

    fn mul(self, rhs: usize) -> Self::Output {
        self.0.raw() * rhs as f64
    }
}

impl Display for Ratio {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.to_f64().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_range_check() -> Result<()> {
        assert!(Ratio::try_from(1.5).is_err());
        assert!(Ratio::try_from(-0.1).is_err());
        assert!(Ratio::try_from(f64::NAN).is_err());

        let ratio = Ratio::try_from(0.8)?;
        assert_eq!(ratio.to_f64(), 0.8);
        assert!(approx::abs_diff_eq!(ratio.complement(), 0.2, epsilon = 1e-12));
        assert!(ratio.checked_add(Ratio::try_from(0.5)?).is_err());
        Ok(())
    }

    #[test]
    fn ratio_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Ratio>("0.25").is_ok());
        assert!(serde_json::from_str::<Ratio>("2.0").is_err());
    }
}
