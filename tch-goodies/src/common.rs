pub use anyhow::{bail, ensure, format_err, Error, Result};
pub use approx::AbsDiffEq;
pub use image::{DynamicImage, Rgb, RgbImage};
pub use noisy_float::prelude::*;
pub use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
pub use std::{
    convert::TryFrom,
    fmt::{self, Display, Formatter},
    ops::Mul,
};
pub use tch::{Device, Kind, Tensor};
