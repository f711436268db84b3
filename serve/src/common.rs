//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use leaf_dl::{
    inference::{InferencePackage, InferencePackageInit, Prediction},
    model::{ModelConfig, ModelVariant},
};
pub use once_cell::sync::Lazy;
pub use semver::{Version, VersionReq};
pub use serde::{de::Error as DeserializeError, Deserialize, Deserializer, Serialize};
pub use std::{
    collections::HashMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::Device;
pub use tracing::{info, warn};

pub type Fallible<T> = Result<T, Error>;
