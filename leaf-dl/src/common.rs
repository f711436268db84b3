//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use image::{imageops::FilterType, DynamicImage, RgbImage};
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::Itertools;
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use regex::Regex;
pub use serde::{Deserialize, Deserializer, Serialize, Serializer};
pub use std::{
    collections::{HashMap, HashSet},
    convert::TryFrom,
    fmt::{self, Debug, Display, Formatter},
    fs, iter,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::{nn, Device, Kind, Tensor};
pub use tch_goodies::{IntoTensor, Ratio, TensorExt, TensorToImage, TryIntoTensor};
pub use tch_tensor_like::TensorLike;
pub use tracing::{debug, info, warn};

pub type Fallible<T> = Result<T, Error>;
